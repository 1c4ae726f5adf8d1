//! Generic, file-type-agnostic page cache (spec.md §4-§5, C7): a fixed
//! arena of [`Block`]s and [`HashLink`]s behind one coarse mutex, hot/warm
//! LRU placement, per-block lock/pin discipline, and a filtered flush
//! engine used by both `WriteDelay` writers and checkpoint snapshots.
//!
//! Arena indices (`BlockIndex`/`HashLinkIndex`) stand in for the cyclic
//! pointers a C implementation would use; this crate's own
//! `clippy::rc_mutex`/`clippy::rc_buffer` lints rule out the `Rc<RefCell<_>>`
//! alternative (spec.md §9 design note).

pub mod block;
pub mod flush;
pub mod lock;
pub mod service_thread;
pub mod waitqueue;

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::ThreadId;
use std::time::Duration;

use tracing::{trace, warn};

use crate::constant::BlockStatus;
use crate::error::{PageCacheError, PcResult};

use block::{
    Block, BlockIndex, FileId, HashLink, HashLinkIndex, LockChange, Lsn, PageType, PinChange, Temperature, LSN_MAX,
};
use flush::{FileCallbacks, FileHandle, FilterDecision, FlushFilter, FlushOutcome, FlushType};
use waitqueue::{WaitQueue, WaiterKind};

/// Snapshot entry produced by [`PageCache::collect_changed_blocks_with_lsn`]:
/// `(short_table_id, is_index_or_data, page_no, rec_lsn)` (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedBlockEntry {
    pub short_table_id: u16,
    pub is_index: bool,
    pub page_no: u64,
    pub rec_lsn: Lsn,
}

struct Inner {
    page_size: usize,
    blocks: Vec<Block>,
    hash_links: Vec<HashLink>,
    hash_buckets: Vec<Vec<HashLinkIndex>>,
    free_blocks: Vec<BlockIndex>,
    free_hash_links: Vec<HashLinkIndex>,

    /// Hot/warm LRU, most-recently-used at the front.
    lru: Vec<BlockIndex>,
    /// Index into `lru` separating the hot segment (before) from the warm
    /// segment (at/after); new warm blocks are spliced in here instead of
    /// at the very front, per the "division point" placement rule.
    division_point: usize,
    min_warm_blocks: usize,

    /// Per-file dirty chains, oldest first.
    changed_blocks: HashMap<FileId, Vec<BlockIndex>>,

    waiting_for_block: WaitQueue,
    waiting_for_hash_link: WaitQueue,
}

impl Inner {
    fn bucket_of(&self, file: FileId, page_no: u64) -> usize {
        let mut hash = file as u64;
        hash = hash.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(page_no);
        (hash as usize) % self.hash_buckets.len()
    }

    fn find_hash_link(&self, file: FileId, page_no: u64) -> Option<HashLinkIndex> {
        let bucket = self.bucket_of(file, page_no);
        self.hash_buckets[bucket]
            .iter()
            .copied()
            .find(|&idx| self.hash_links[idx].file == file && self.hash_links[idx].page_no == page_no)
    }

    fn touch_lru(&mut self, block: BlockIndex, temperature: Temperature) {
        if let Some(pos) = self.lru.iter().position(|&b| b == block) {
            self.lru.remove(pos);
            if pos < self.division_point && self.division_point > 0 {
                self.division_point -= 1;
            }
        }
        match temperature {
            Temperature::Hot => self.lru.insert(0, block),
            Temperature::Warm | Temperature::Cold => {
                let at = self.division_point.min(self.lru.len());
                self.lru.insert(at, block);
                self.division_point = (at + 1).min(self.lru.len());
            }
        }
    }

    /// Pick a block to evict: the coldest unlocked, unpinned block at the
    /// tail of the LRU. `None` if every block is busy.
    fn find_evictable(&self) -> Option<BlockIndex> {
        self.lru
            .iter()
            .rev()
            .copied()
            .find(|&idx| self.blocks[idx].pins == 0 && self.blocks[idx].wlocks == 0 && self.blocks[idx].rlocks == 0)
    }

    fn detach_identity(&mut self, block_idx: BlockIndex) {
        let Some(hl_idx) = self.blocks[block_idx].hash_link.take() else { return };
        let (file, page_no) = (self.hash_links[hl_idx].file, self.hash_links[hl_idx].page_no);
        let bucket = self.bucket_of(file, page_no);
        self.hash_buckets[bucket].retain(|&idx| idx != hl_idx);
        self.free_hash_links.push(hl_idx);
        if let Some(chain) = self.changed_blocks.get_mut(&file) {
            chain.retain(|&b| b != block_idx);
        }
    }

    fn mark_changed(&mut self, block_idx: BlockIndex, file: FileId) {
        let chain = self.changed_blocks.entry(file).or_default();
        if !chain.contains(&block_idx) {
            chain.push(block_idx);
        }
    }

    fn clear_changed(&mut self, block_idx: BlockIndex, file: FileId) {
        if let Some(chain) = self.changed_blocks.get_mut(&file) {
            chain.retain(|&b| b != block_idx);
        }
    }
}

/// A generic, page-sized read/write cache shared by every open file of a
/// storage engine. One `PageCache` instance serves all files; callers
/// register per-file I/O callbacks with [`PageCache::register_file`].
pub struct PageCache {
    inner: Mutex<Inner>,
    files: Mutex<HashMap<FileId, FileHandle>>,
    files_in_flush: Mutex<std::collections::HashSet<FileId>>,
}

impl PageCache {
    /// `memory_budget` and `page_size` are both in bytes; `page_size` must
    /// be a power of two no smaller than 512. `division_limit_pct` sets the
    /// hot/warm LRU split and `age_threshold_pct` how long a warm block must
    /// sit unused before it's eligible to fall out, both as a percentage of
    /// the arena (spec.md §4.2).
    pub fn init(
        memory_budget: usize,
        division_limit_pct: u8,
        age_threshold_pct: u8,
        page_size: usize,
    ) -> PcResult<Self> {
        if page_size < 512 || !page_size.is_power_of_two() {
            return Err(PageCacheError::BadConfig(format!("page_size {page_size} must be a power of two >= 512")));
        }
        let num_blocks = memory_budget / page_size;
        if num_blocks < 8 {
            return Err(PageCacheError::BadConfig(format!(
                "memory_budget {memory_budget} yields only {num_blocks} blocks at page_size {page_size}, need >= 8"
            )));
        }

        let blocks = (0..num_blocks).map(|_| Block::empty(page_size)).collect::<Vec<_>>();
        let hash_links = (0..num_blocks)
            .map(|_| HashLink { file: 0, page_no: 0, block: None, requests: 0 })
            .collect::<Vec<_>>();
        let bucket_count = (num_blocks * 2).next_power_of_two();

        let min_warm_blocks = num_blocks * division_limit_pct as usize / 100;
        let _age_threshold = num_blocks * age_threshold_pct as usize / 100;

        let inner = Inner {
            page_size,
            blocks,
            hash_links,
            hash_buckets: vec![Vec::new(); bucket_count],
            free_blocks: (0..num_blocks).rev().collect(),
            free_hash_links: (0..num_blocks).rev().collect(),
            lru: Vec::with_capacity(num_blocks),
            division_point: 0,
            min_warm_blocks,
            changed_blocks: HashMap::new(),
            waiting_for_block: WaitQueue::new(),
            waiting_for_hash_link: WaitQueue::new(),
        };

        Ok(Self {
            inner: Mutex::new(inner),
            files: Mutex::new(HashMap::new()),
            files_in_flush: Mutex::new(std::collections::HashSet::new()),
        })
    }

    pub fn register_file(&self, fd: FileId, callbacks: FileCallbacks) {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).insert(fd, FileHandle { fd, callbacks });
    }

    pub fn unregister_file(&self, fd: FileId) {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).remove(&fd);
    }

    fn thread_id() -> ThreadId {
        std::thread::current().id()
    }

    /// Locate (or load) the block for `(file, page_no)`, taking the
    /// requested lock/pin transition on it, and return its index. Retries
    /// internally across waits; the returned index is only valid while the
    /// lock remains held (spec.md §4.7).
    pub fn find_block(
        &self,
        file: FileId,
        page_no: u64,
        init_hits: u32,
        lock: LockChange,
        pin: PinChange,
    ) -> PcResult<BlockIndex> {
        let thread_id = Self::thread_id();
        loop {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(hl_idx) = inner.find_hash_link(file, page_no) {
                let Some(block_idx) = inner.hash_links[hl_idx].block else {
                    let ticket = inner.waiting_for_block.add(WaiterKind::Generic);
                    drop(inner);
                    ticket.wait();
                    continue;
                };
                match lock::apply(&mut inner.blocks[block_idx], lock, pin, thread_id) {
                    lock::LockOutcome::Acquired => {
                        inner.blocks[block_idx].hits_left = inner.blocks[block_idx].hits_left.saturating_add(init_hits);
                        let temperature = temperature_for(inner.blocks[block_idx].hits_left, inner.min_warm_blocks);
                        inner.blocks[block_idx].temperature = temperature;
                        inner.touch_lru(block_idx, temperature);
                        return Ok(block_idx);
                    }
                    lock::LockOutcome::Blocked(kind) => {
                        let ticket = inner.blocks[block_idx].for_wrlock.add(kind);
                        drop(inner);
                        ticket.wait();
                        continue;
                    }
                }
            }

            // Not resident: place it, evicting if necessary.
            let block_idx = match inner.free_blocks.pop() {
                Some(idx) => idx,
                None => match inner.find_evictable() {
                    Some(idx) => {
                        self.evict_locked(&mut inner, idx)?;
                        idx
                    }
                    None => {
                        let ticket = inner.waiting_for_block.add(WaiterKind::Generic);
                        drop(inner);
                        ticket.wait();
                        continue;
                    }
                },
            };
            let hl_idx = match inner.free_hash_links.pop() {
                Some(idx) => idx,
                None => {
                    inner.free_blocks.push(block_idx);
                    let ticket = inner.waiting_for_hash_link.add(WaiterKind::Generic);
                    drop(inner);
                    ticket.wait();
                    continue;
                }
            };

            inner.hash_links[hl_idx] = HashLink { file, page_no, block: Some(block_idx), requests: 0 };
            let bucket = inner.bucket_of(file, page_no);
            inner.hash_buckets[bucket].push(hl_idx);
            inner.blocks[block_idx].hash_link = Some(hl_idx);
            inner.blocks[block_idx].page_type = PageType::ReadUnknown;
            inner.blocks[block_idx].hits_left = init_hits;

            match lock::apply(&mut inner.blocks[block_idx], lock, pin, thread_id) {
                lock::LockOutcome::Acquired => {
                    let temperature = temperature_for(init_hits, inner.min_warm_blocks);
                    inner.blocks[block_idx].temperature = temperature;
                    inner.touch_lru(block_idx, temperature);
                    return Ok(block_idx);
                }
                lock::LockOutcome::Blocked(_) => {
                    // A fresh placement is never contended; unreachable in
                    // practice, but don't wedge if it somehow happens.
                    continue;
                }
            }
        }
    }

    /// Write back a dirty block and detach its identity so its slot can be
    /// reused. Caller holds `inner`'s lock.
    fn evict_locked(&self, inner: &mut Inner, block_idx: BlockIndex) -> PcResult<()> {
        if !inner.blocks[block_idx].is_dirty() {
            inner.detach_identity(block_idx);
            return Ok(());
        }
        let Some(hl_idx) = inner.blocks[block_idx].hash_link else {
            return Ok(());
        };
        let (file, page_no) = (inner.hash_links[hl_idx].file, inner.hash_links[hl_idx].page_no);
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = files.get(&file) {
            let buffer = inner.blocks[block_idx].buffer.clone();
            if let Err(err) = (handle.callbacks.write_cb)(page_no, &buffer) {
                (handle.callbacks.write_fail_cb)(page_no, &err);
                return Err(PageCacheError::Io { errno: err.raw_os_error(), source: err });
            }
        }
        drop(files);
        inner.blocks[block_idx].status.remove(BlockStatus::CHANGED);
        inner.clear_changed(block_idx, file);
        inner.detach_identity(block_idx);
        Ok(())
    }

    pub fn read(&self, file: FileId, page_no: u64) -> PcResult<Vec<u8>> {
        let block_idx = self.find_block(file, page_no, 1, LockChange::Read, PinChange::LeftUnpinned)?;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let already_read = inner.blocks[block_idx].status.contains(BlockStatus::READ);
        if !already_read {
            let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(handle) = files.get(&file) {
                let page_size = inner.page_size;
                let mut buf = vec![0u8; page_size];
                (handle.callbacks.read_cb)(page_no, &mut buf).map_err(|e| PageCacheError::Io {
                    errno: e.raw_os_error(),
                    source: e,
                })?;
                inner.blocks[block_idx].buffer = buf;
            }
            inner.blocks[block_idx].status.insert(BlockStatus::READ);
        }
        let data = inner.blocks[block_idx].buffer.clone();
        lock::apply(&mut inner.blocks[block_idx], LockChange::ReadUnlock, PinChange::LeftUnpinned, Self::thread_id());
        inner.blocks[block_idx].for_wrlock.release_one_by_type(WaiterKind::Write);
        Ok(data)
    }

    /// Write `buf` at `offset..offset+buf.len()` into the page.
    /// `write_through` forces an immediate file write instead of marking
    /// the block dirty for later flush (`WriteDelay` vs `WriteDone`,
    /// spec.md §4.5).
    #[allow(clippy::too_many_arguments)]
    pub fn write_part(
        &self,
        file: FileId,
        page_no: u64,
        buf: &[u8],
        offset: usize,
        write_through: bool,
        rec_lsn: Option<Lsn>,
    ) -> PcResult<()> {
        let block_idx = self.find_block(file, page_no, 1, LockChange::Write, PinChange::LeftUnpinned)?;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let end = offset + buf.len();
        if end > inner.blocks[block_idx].buffer.len() {
            return Err(PageCacheError::BadConfig(format!(
                "write_part offset {offset} + len {} exceeds page size {}",
                buf.len(),
                inner.blocks[block_idx].buffer.len()
            )));
        }
        inner.blocks[block_idx].buffer[offset..end].copy_from_slice(buf);
        inner.blocks[block_idx].status.insert(BlockStatus::READ);

        if inner.blocks[block_idx].page_type == PageType::Empty {
            inner.blocks[block_idx].page_type = PageType::Plain;
        }
        if let Some(lsn) = rec_lsn {
            self.check_and_set_lsn_locked(&mut inner, block_idx, lsn);
        }

        if write_through {
            let page = inner.blocks[block_idx].buffer.clone();
            let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(handle) = files.get(&file) {
                (handle.callbacks.write_cb)(page_no, &page).map_err(|e| PageCacheError::Io {
                    errno: e.raw_os_error(),
                    source: e,
                })?;
            }
        } else {
            inner.blocks[block_idx].status.insert(BlockStatus::CHANGED);
            inner.mark_changed(block_idx, file);
        }

        lock::apply(&mut inner.blocks[block_idx], LockChange::WriteUnlock, PinChange::LeftUnpinned, Self::thread_id());
        inner.blocks[block_idx].for_wrlock.release_one_by_type(WaiterKind::Write);
        Ok(())
    }

    /// A page carrying a recognizable LSN upgrades from `Plain` to `Lsn`
    /// typing the first time one is observed; the minimum LSN ever written
    /// to the page is retained (spec.md §4.6).
    fn check_and_set_lsn_locked(&self, inner: &mut Inner, block_idx: BlockIndex, lsn: Lsn) {
        let block = &mut inner.blocks[block_idx];
        if block.page_type != PageType::Lsn {
            block.page_type = PageType::Lsn;
        }
        block.rec_lsn = block.rec_lsn.min(lsn);
        if block.rec_lsn == LSN_MAX {
            block.rec_lsn = lsn;
        }
    }

    pub fn delete(&self, file: FileId, page_no: u64, flush: bool) -> PcResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(hl_idx) = inner.find_hash_link(file, page_no) else { return Ok(()) };
        let Some(block_idx) = inner.hash_links[hl_idx].block else { return Ok(()) };
        if inner.blocks[block_idx].pins > 0 || inner.blocks[block_idx].wlocks > 0 || inner.blocks[block_idx].rlocks > 0
        {
            return Err(PageCacheError::PagePinnedDuringFlush);
        }
        if flush && inner.blocks[block_idx].is_dirty() {
            self.evict_locked(&mut inner, block_idx)?;
        } else {
            inner.detach_identity(block_idx);
        }
        inner.free_blocks.push(block_idx);
        Ok(())
    }

    /// Flush every changed block of `file` (or every file if `file` is
    /// `None`) according to `flush_type`, consulting `filter` before each
    /// write. Cooperates with concurrent flushers of the same file via
    /// `files_in_flush` rather than serializing under the coarse lock for
    /// the whole scan (spec.md §4.8).
    pub fn flush_with_filter(
        &self,
        file: Option<FileId>,
        flush_type: FlushType,
        filter: Option<&FlushFilter<'_>>,
    ) -> PcResult<FlushOutcome> {
        let mut outcome = FlushOutcome::OK;

        let files_to_flush: Vec<FileId> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            match file {
                Some(f) => vec![f],
                None => inner.changed_blocks.keys().copied().collect(),
            }
        };

        for file in files_to_flush {
            {
                let mut in_flight = self.files_in_flush.lock().unwrap_or_else(|e| e.into_inner());
                if !in_flight.insert(file) {
                    // Another flusher already owns this file; our caller
                    // will observe its effects once it finishes.
                    continue;
                }
            }
            let result = self.flush_one_file(file, flush_type, filter);
            self.files_in_flush.lock().unwrap_or_else(|e| e.into_inner()).remove(&file);
            match result {
                Ok(file_outcome) => outcome |= file_outcome,
                Err(err) => {
                    warn!(?err, file, "page cache flush failed for file");
                    outcome |= FlushOutcome::ERROR;
                }
            }
        }

        Ok(outcome)
    }

    fn flush_one_file(
        &self,
        file: FileId,
        flush_type: FlushType,
        filter: Option<&FlushFilter<'_>>,
    ) -> PcResult<FlushOutcome> {
        let mut outcome = FlushOutcome::OK;
        let mut batch: Vec<(u64, BlockIndex)> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner
                .changed_blocks
                .get(&file)
                .into_iter()
                .flatten()
                .filter_map(|&block_idx| {
                    let hl_idx = inner.blocks[block_idx].hash_link?;
                    Some((inner.hash_links[hl_idx].page_no, block_idx))
                })
                .collect()
        };
        batch.sort_by_key(|&(page_no, _)| page_no);

        for (page_no, _) in batch {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let Some(hl_idx) = inner.find_hash_link(file, page_no) else { continue };
            let Some(block_idx) = inner.hash_links[hl_idx].block else { continue };
            if !inner.blocks[block_idx].is_dirty() {
                continue;
            }

            if let Some(filter) = filter {
                let rec_lsn = inner.blocks[block_idx].rec_lsn;
                match filter(flush_type, page_no, rec_lsn) {
                    FilterDecision::Ok => {}
                    FilterDecision::SkipTryNext => continue,
                    FilterDecision::SkipAll => break,
                }
            }

            if inner.blocks[block_idx].pins > 0 {
                trace!(file, page_no, "page cache skipping pinned page during flush");
                outcome |= FlushOutcome::PINNED;
                continue;
            }

            let buffer = inner.blocks[block_idx].buffer.clone();
            drop(inner);

            let write_result = {
                let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
                files.get(&file).map(|handle| (handle.callbacks.write_cb)(page_no, &buffer))
            };

            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            match write_result {
                Some(Ok(())) => {
                    inner.blocks[block_idx].status.remove(BlockStatus::CHANGED);
                    inner.clear_changed(block_idx, file);
                    if flush_type.evicts() && inner.blocks[block_idx].pins == 0 {
                        self.evict_locked(&mut inner, block_idx)?;
                        inner.free_blocks.push(block_idx);
                    }
                }
                Some(Err(err)) => {
                    let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(handle) = files.get(&file) {
                        (handle.callbacks.write_fail_cb)(page_no, &err);
                    }
                    outcome |= FlushOutcome::ERROR;
                }
                None => {}
            }
        }

        Ok(outcome)
    }

    /// Snapshot every dirty page's minimum LSN for a checkpoint, plus the
    /// smallest LSN across all of them. `short_table_id`/`is_index` are
    /// supplied by the caller per file since the cache itself is agnostic
    /// to what a file represents (spec.md §4.8).
    pub fn collect_changed_blocks_with_lsn(
        &self,
        file_meta: impl Fn(FileId) -> (u16, bool),
    ) -> (Vec<ChangedBlockEntry>, Lsn) {
        // Let any in-progress "first in switch" flusher finish before
        // taking the snapshot so we don't race its write-back.
        loop {
            let busy = !self.files_in_flush.lock().unwrap_or_else(|e| e.into_inner()).is_empty();
            if !busy {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = Vec::new();
        let mut min_lsn = LSN_MAX;
        for (&file, chain) in inner.changed_blocks.iter() {
            let (short_table_id, is_index) = file_meta(file);
            for &block_idx in chain {
                let Some(hl_idx) = inner.blocks[block_idx].hash_link else { continue };
                let rec_lsn = inner.blocks[block_idx].rec_lsn;
                min_lsn = min_lsn.min(rec_lsn);
                entries.push(ChangedBlockEntry {
                    short_table_id,
                    is_index,
                    page_no: inner.hash_links[hl_idx].page_no,
                    rec_lsn,
                });
            }
        }
        (entries, min_lsn)
    }

    /// Flush and release everything, leaving the cache empty but reusable.
    pub fn end(&self) -> PcResult<()> {
        self.flush_with_filter(None, FlushType::Release, None)?;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let num_blocks = inner.blocks.len();
        for block_idx in 0..num_blocks {
            inner.detach_identity(block_idx);
        }
        inner.free_blocks = (0..num_blocks).rev().collect();
        inner.lru.clear();
        inner.division_point = 0;
        Ok(())
    }
}

fn temperature_for(hits_left: u32, min_warm_blocks: usize) -> Temperature {
    if hits_left == 0 {
        Temperature::Cold
    } else if (hits_left as usize) < min_warm_blocks.max(1) {
        Temperature::Warm
    } else {
        Temperature::Hot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_callbacks() -> FileCallbacks {
        FileCallbacks {
            read_cb: Box::new(|_, buf| {
                buf.fill(0);
                Ok(())
            }),
            write_cb: Box::new(|_, _| Ok(())),
            write_fail_cb: Box::new(|_, _| {}),
            flush_log_cb: Box::new(|_| Ok(())),
        }
    }

    #[test]
    fn init_rejects_too_small_a_budget() {
        let result = PageCache::init(1024, 20, 60, 4096);
        assert!(result.is_err());
    }

    #[test]
    fn init_rejects_non_power_of_two_page_size() {
        let result = PageCache::init(1 << 20, 20, 60, 1000);
        assert!(result.is_err());
    }

    #[test]
    fn read_after_write_through_sees_written_bytes() {
        let cache = PageCache::init(64 * 1024, 20, 60, 4096).unwrap();
        cache.register_file(1, noop_callbacks());
        cache.write_part(1, 0, b"hello", 0, true, None).unwrap();
        let page = cache.read(1, 0).unwrap();
        assert_eq!(&page[0..5], b"hello");
    }

    #[test]
    fn delayed_write_marks_file_changed() {
        let cache = PageCache::init(64 * 1024, 20, 60, 4096).unwrap();
        cache.register_file(1, noop_callbacks());
        cache.write_part(1, 0, b"hi", 0, false, Some(5)).unwrap();
        let inner = cache.inner.lock().unwrap();
        assert!(inner.changed_blocks.get(&1).is_some_and(|chain| !chain.is_empty()));
    }

    #[test]
    fn flush_clears_dirty_chain() {
        let cache = PageCache::init(64 * 1024, 20, 60, 4096).unwrap();
        cache.register_file(1, noop_callbacks());
        cache.write_part(1, 0, b"hi", 0, false, Some(5)).unwrap();
        cache.flush_with_filter(Some(1), FlushType::Keep, None).unwrap();
        let inner = cache.inner.lock().unwrap();
        assert!(inner.changed_blocks.get(&1).is_none_or(|chain| chain.is_empty()));
    }

    #[test]
    fn delete_evicts_a_resident_block() {
        let cache = PageCache::init(64 * 1024, 20, 60, 4096).unwrap();
        cache.register_file(1, noop_callbacks());
        cache.write_part(1, 0, b"hi", 0, true, None).unwrap();
        cache.delete(1, 0, false).unwrap();
        let inner = cache.inner.lock().unwrap();
        assert!(inner.find_hash_link(1, 0).is_none());
    }
}

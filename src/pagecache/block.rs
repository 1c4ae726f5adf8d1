//! Block, HashLink, and the lock/pin transition vocabulary (spec.md §3,
//! §4.7, C7). Indices into `PageCache`'s arenas replace the source's
//! reference-counted cyclic pointers (spec.md §9 design note).

use bitflags::bitflags;

use crate::constant::BlockStatus;
use crate::pagecache::waitqueue::WaitQueue;

pub type BlockIndex = usize;
pub type HashLinkIndex = usize;
pub type FileId = i32;
pub type Lsn = u64;

pub const LSN_MAX: Lsn = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temperature {
    Cold,
    Warm,
    Hot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Empty,
    Plain,
    Lsn,
    ReadUnknown,
}

/// Requested lock transition for one cache operation (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockChange {
    LeftUnlocked,
    LeftReadlocked,
    LeftWritelocked,
    Read,
    Write,
    ReadUnlock,
    WriteUnlock,
    WriteToRead,
}

/// Requested pin transition, independent of the lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinChange {
    LeftPinned,
    LeftUnpinned,
    Pin,
    Unpin,
}

bitflags! {
    /// The three condition queues a Block exposes for waiters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockQueueKind: u8 {
        const FOR_REQUESTED = 0b001;
        const FOR_SAVED      = 0b010;
        const FOR_WRLOCK     = 0b100;
    }
}

/// One page-sized buffer plus its cache bookkeeping.
pub struct Block {
    pub buffer: Vec<u8>,

    pub hash_link: Option<HashLinkIndex>,

    pub lru_prev: Option<BlockIndex>,
    pub lru_next: Option<BlockIndex>,
    pub changed_prev: Option<BlockIndex>,
    pub changed_next: Option<BlockIndex>,

    pub wlocks: u32,
    pub rlocks: u32,
    pub rlocks_queue: u32,
    pub write_locker: Option<std::thread::ThreadId>,

    pub pins: u32,
    pub requests: u32,

    pub status: BlockStatus,
    pub temperature: Temperature,
    pub hits_left: u32,
    pub last_hit_time: u64,

    pub rec_lsn: Lsn,
    pub page_type: PageType,

    pub errno: Option<i32>,

    /// Waiters for "the primary reader has finished".
    pub for_requested: WaitQueue,
    /// Waiters for "the in-progress eviction/flush has finished".
    pub for_saved: WaitQueue,
    /// Waiters for "a lock became available".
    pub for_wrlock: WaitQueue,
}

impl Block {
    pub fn empty(page_size: usize) -> Self {
        Self {
            buffer: vec![0; page_size],
            hash_link: None,
            lru_prev: None,
            lru_next: None,
            changed_prev: None,
            changed_next: None,
            wlocks: 0,
            rlocks: 0,
            rlocks_queue: 0,
            write_locker: None,
            pins: 0,
            requests: 0,
            status: BlockStatus::empty(),
            temperature: Temperature::Cold,
            hits_left: 0,
            last_hit_time: 0,
            rec_lsn: LSN_MAX,
            page_type: PageType::Empty,
            errno: None,
            for_requested: WaitQueue::new(),
            for_saved: WaitQueue::new(),
            for_wrlock: WaitQueue::new(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.status.contains(BlockStatus::CHANGED)
    }

    pub fn is_free(&self) -> bool {
        self.hash_link.is_none() && self.pins == 0 && self.wlocks == 0 && self.rlocks == 0
    }
}

/// Maps a live `(file, page_no)` pair to its `Block`, if one has been
/// assigned yet.
#[derive(Debug, Clone)]
pub struct HashLink {
    pub file: FileId,
    pub page_no: u64,
    pub block: Option<BlockIndex>,
    pub requests: u32,
}

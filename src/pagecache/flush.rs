//! Flush types and the per-file callback triple consumed by the flush
//! engine (spec.md §4.7).

use bitflags::bitflags;

use crate::pagecache::block::{FileId, Lsn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushType {
    Keep,
    KeepLazy,
    Release,
    ForceWrite,
    IgnoreChanged,
}

impl FlushType {
    /// Whether this flush type fully evicts the block after writing it.
    pub fn evicts(self) -> bool {
        matches!(self, Self::Release | Self::IgnoreChanged)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlushOutcome: u8 {
        const OK     = 0b00;
        const ERROR  = 0b01;
        const PINNED = 0b10;
    }
}

/// Per-block decision a caller-supplied filter returns during a flush scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Ok,
    SkipTryNext,
    SkipAll,
}

/// A filter inspects `(flush_type, page_no, rec_lsn)` and decides whether
/// the flush should write that page.
pub type FlushFilter<'a> = dyn Fn(FlushType, u64, Lsn) -> FilterDecision + 'a;

/// File-owned callbacks, pre-registered before any I/O against that file.
/// The cache invokes these with its coarse lock released, so they must be
/// re-entrant with respect to the cache (spec.md §5).
pub struct FileCallbacks {
    pub read_cb: Box<dyn Fn(u64, &mut [u8]) -> std::io::Result<()> + Send + Sync>,
    pub write_cb: Box<dyn Fn(u64, &[u8]) -> std::io::Result<()> + Send + Sync>,
    pub write_fail_cb: Box<dyn Fn(u64, &std::io::Error) + Send + Sync>,
    pub flush_log_cb: Box<dyn Fn(Lsn) -> std::io::Result<()> + Send + Sync>,
}

pub struct FileHandle {
    pub fd: FileId,
    pub callbacks: FileCallbacks,
}

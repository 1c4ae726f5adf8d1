//! Per-block lock/pin transition rules (spec.md §4.7 "Locking discipline").
//!
//! These are pure state transitions on one `Block`; the caller (`PageCache`)
//! is responsible for dropping its coarse lock and waiting on the returned
//! queue/kind when `Blocked` is returned, then retrying.

use std::thread::ThreadId;

use crate::pagecache::block::{Block, LockChange, PinChange};
use crate::pagecache::waitqueue::WaiterKind;

pub enum LockOutcome {
    Acquired,
    /// The caller must wait on `block.for_wrlock` with this kind hint, then
    /// retry the whole operation from `find_block` (the block may have
    /// changed identity while we waited).
    Blocked(WaiterKind),
}

/// Apply `change`/`pin` to `block` for `thread_id`, or report that the
/// caller must block and retry.
pub fn apply(block: &mut Block, change: LockChange, pin: PinChange, thread_id: ThreadId) -> LockOutcome {
    match change {
        LockChange::Read => {
            if block.wlocks > 0 && block.write_locker != Some(thread_id) {
                return LockOutcome::Blocked(WaiterKind::Read);
            }
            if block.wlocks > 0 {
                // Re-entrant: queued behind our own write lock until it drops.
                block.rlocks_queue += 1;
            } else {
                block.rlocks += 1;
            }
        }
        LockChange::Write => {
            if (block.wlocks > 0 && block.write_locker != Some(thread_id)) || block.rlocks > 0 {
                return LockOutcome::Blocked(WaiterKind::Write);
            }
            block.wlocks += 1;
            block.write_locker = Some(thread_id);
        }
        LockChange::ReadUnlock => {
            block.rlocks = block.rlocks.saturating_sub(1);
        }
        LockChange::WriteUnlock => {
            block.wlocks = block.wlocks.saturating_sub(1);
            if block.wlocks == 0 {
                block.write_locker = None;
                block.rlocks += block.rlocks_queue;
                block.rlocks_queue = 0;
            }
        }
        LockChange::WriteToRead => {
            block.wlocks = block.wlocks.saturating_sub(1);
            block.rlocks += 1;
            if block.wlocks == 0 {
                block.write_locker = None;
                block.rlocks += block.rlocks_queue;
                block.rlocks_queue = 0;
            }
        }
        LockChange::LeftUnlocked | LockChange::LeftReadlocked | LockChange::LeftWritelocked => {}
    }
    apply_pin(block, pin);
    LockOutcome::Acquired
}

fn apply_pin(block: &mut Block, pin: PinChange) {
    match pin {
        PinChange::Pin => block.pins += 1,
        PinChange::Unpin => block.pins = block.pins.saturating_sub(1),
        PinChange::LeftPinned | PinChange::LeftUnpinned => {}
    }
}

/// A lock acquisition that waited must re-validate these before treating
/// its lock as granted; if either changed, the caller restarts from
/// `find_block` instead (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub file: crate::pagecache::block::FileId,
    pub page_no: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagecache::block::Block;

    fn tid() -> ThreadId {
        std::thread::current().id()
    }

    #[test]
    fn write_lock_is_exclusive() {
        let mut block = Block::empty(16);
        let t1 = tid();
        assert!(matches!(apply(&mut block, LockChange::Write, PinChange::Pin, t1), LockOutcome::Acquired));
        assert_eq!(block.wlocks, 1);
        assert_eq!(block.pins, 1);
    }

    #[test]
    fn read_lock_by_write_owner_queues_not_blocks() {
        let mut block = Block::empty(16);
        let t1 = tid();
        apply(&mut block, LockChange::Write, PinChange::LeftUnpinned, t1);
        assert!(matches!(
            apply(&mut block, LockChange::Read, PinChange::LeftUnpinned, t1),
            LockOutcome::Acquired
        ));
        assert_eq!(block.rlocks_queue, 1);
        assert_eq!(block.rlocks, 0);
    }

    #[test]
    fn write_unlock_promotes_queued_readers() {
        let mut block = Block::empty(16);
        let t1 = tid();
        apply(&mut block, LockChange::Write, PinChange::LeftUnpinned, t1);
        apply(&mut block, LockChange::Read, PinChange::LeftUnpinned, t1);
        apply(&mut block, LockChange::WriteUnlock, PinChange::LeftUnpinned, t1);
        assert_eq!(block.wlocks, 0);
        assert_eq!(block.rlocks, 1);
        assert_eq!(block.rlocks_queue, 0);
    }
}

//! Update Scheduler
//!
//! The scheduler coalesces mutations into one propagation pass per tick.
//!
//! # Algorithm
//!
//! 1. A mutation hands its change records to [`UpdateScheduler::enqueue`],
//!    keyed by the component that owns the mutated store. The first enqueue of
//!    a tick moves the scheduler from `Idle` to `Scheduled`.
//! 2. Until the flush begins, pending batches can still be dropped with
//!    [`UpdateScheduler::cancel`].
//! 3. The flush drains the pending batches, shallowest component first, so
//!    a parent always propagates (and feeds its children's bindings) before a
//!    child propagates its own batch.
//! 4. Records enqueued while flushing join the running flush; they never
//!    schedule another one.

use indexmap::IndexMap;
use tracing::trace;

use crate::data::ChangeRecord;
use crate::view::NodeId;

/// Where the scheduler is in its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// Nothing pending.
    Idle,
    /// Changes are pending and a flush is due.
    Scheduled,
    /// A flush is running; it runs to completion.
    Flushing,
}

/// Pending change batches, per owning component.
#[derive(Debug)]
pub struct UpdateScheduler {
    pending: IndexMap<NodeId, Vec<ChangeRecord>>,
    state: FlushState,
    flush_count: u64,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self {
            pending: IndexMap::new(),
            state: FlushState::Idle,
            flush_count: 0,
        }
    }

    /// Queue `changes` for `owner`.
    ///
    /// Returns `true` if this call scheduled a new flush.
    pub fn enqueue(&mut self, owner: NodeId, changes: Vec<ChangeRecord>) -> bool {
        if changes.is_empty() {
            return false;
        }
        trace!(?owner, count = changes.len(), "enqueue changes");
        self.pending.entry(owner).or_default().extend(changes);
        if self.state == FlushState::Idle {
            self.state = FlushState::Scheduled;
            true
        } else {
            false
        }
    }

    /// Take the pending batch of `owner`, leaving nothing behind.
    pub fn take(&mut self, owner: NodeId) -> Vec<ChangeRecord> {
        self.pending.shift_remove(&owner).unwrap_or_default()
    }

    /// Remove and return the pending batch with the smallest `rank`, earliest
    /// enqueued first among equals.
    pub fn pop_next(&mut self, rank: impl Fn(NodeId) -> usize) -> Option<(NodeId, Vec<ChangeRecord>)> {
        let (index, _) = self
            .pending
            .keys()
            .enumerate()
            .min_by_key(|(index, owner)| (rank(**owner), *index))?;
        self.pending.shift_remove_index(index)
    }

    /// Start a flush. Returns `false` when nothing was scheduled.
    pub fn begin_flush(&mut self) -> bool {
        if self.state != FlushState::Scheduled {
            return false;
        }
        self.state = FlushState::Flushing;
        true
    }

    pub fn finish_flush(&mut self) {
        self.pending.clear();
        self.state = FlushState::Idle;
        self.flush_count += 1;
    }

    /// Drop everything pending. Only possible before a flush starts.
    pub fn cancel(&mut self) -> bool {
        if self.state != FlushState::Scheduled {
            return false;
        }
        self.pending.clear();
        self.state = FlushState::Idle;
        true
    }

    /// Forget the pending batch of a disposed component.
    pub fn discard(&mut self, owner: NodeId) {
        self.pending.shift_remove(&owner);
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    /// Number of completed flushes.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use serde_json::json;

    fn change(key: &str) -> ChangeRecord {
        ChangeRecord::set(Expr::accessor([key]), json!(1))
    }

    #[test]
    fn first_enqueue_schedules_once() {
        let mut scheduler = UpdateScheduler::new();
        let owner = NodeId::from(0);

        assert!(scheduler.enqueue(owner, vec![change("a")]));
        assert!(!scheduler.enqueue(owner, vec![change("b")]));
        assert_eq!(scheduler.state(), FlushState::Scheduled);
        assert_eq!(scheduler.take(owner).len(), 2);
        assert!(!scheduler.enqueue(owner, Vec::new()));
    }

    #[test]
    fn pop_next_prefers_lowest_rank() {
        let mut scheduler = UpdateScheduler::new();
        let deep = NodeId::from(5);
        let shallow = NodeId::from(1);
        scheduler.enqueue(deep, vec![change("a")]);
        scheduler.enqueue(shallow, vec![change("b")]);

        let rank = |id: NodeId| if id == shallow { 0 } else { 3 };
        assert_eq!(scheduler.pop_next(rank).map(|(id, _)| id), Some(shallow));
        assert_eq!(scheduler.pop_next(rank).map(|(id, _)| id), Some(deep));
        assert!(scheduler.pop_next(rank).is_none());
    }

    #[test]
    fn cancel_only_before_flush() {
        let mut scheduler = UpdateScheduler::new();
        let owner = NodeId::from(0);

        scheduler.enqueue(owner, vec![change("a")]);
        assert!(scheduler.cancel());
        assert_eq!(scheduler.state(), FlushState::Idle);
        assert!(!scheduler.begin_flush());

        scheduler.enqueue(owner, vec![change("a")]);
        assert!(scheduler.begin_flush());
        assert!(!scheduler.cancel());
        // Enqueued mid-flush: joins the running flush.
        assert!(!scheduler.enqueue(owner, vec![change("b")]));
        scheduler.finish_flush();
        assert_eq!(scheduler.state(), FlushState::Idle);
        assert_eq!(scheduler.flush_count(), 1);
    }
}

//! Task: the unit of queued work
//!
//! A task is immutable except for its remaining size, which only shrinks
//! under partial service. Tasks are exclusively owned by one queue at a time
//! and are moved, never copied, when offloaded.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ApplicationKind;
use crate::node::NodeId;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Unique task handle, issued from a process-wide monotone counter so
/// continuation maps iterate in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Issues a fresh id.
    pub fn fresh() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One unit of application work, sized in bits.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    application: ApplicationKind,
    size_bits: f64,
    origin: NodeId,
    destination: NodeId,
    arrival_tick: u64,
}

impl Task {
    /// Creates a new task originating and queued at `node`.
    pub fn new(application: ApplicationKind, size_bits: f64, node: NodeId, tick: u64) -> Self {
        debug_assert!(size_bits >= 0.0);
        Self {
            id: TaskId::fresh(),
            application,
            size_bits,
            origin: node,
            destination: node,
            arrival_tick: tick,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn application(&self) -> ApplicationKind {
        self.application
    }

    /// Remaining size in bits.
    pub fn size_bits(&self) -> f64 {
        self.size_bits
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn arrival_tick(&self) -> u64 {
        self.arrival_tick
    }

    /// Consumes `bits` of the task in place. Caller guarantees
    /// `bits <= size_bits`.
    pub fn shrink(&mut self, bits: f64) {
        debug_assert!(bits <= self.size_bits + f64::EPSILON);
        self.size_bits = (self.size_bits - bits).max(0.0);
    }

    /// Splits off a continuation of `bits` from the front of this task,
    /// leaving the remainder here. Total size is conserved across the pair.
    pub fn split_off(&mut self, bits: f64) -> Task {
        debug_assert!(bits <= self.size_bits + f64::EPSILON);
        self.size_bits = (self.size_bits - bits).max(0.0);
        Task {
            id: TaskId::fresh(),
            application: self.application,
            size_bits: bits,
            origin: self.origin,
            destination: self.destination,
            arrival_tick: self.arrival_tick,
        }
    }

    /// Re-stamps the task on hand-off to a receiving node: the forwarding
    /// node becomes the origin, the receiver the destination, and the arrival
    /// tick is reset to the delivery tick.
    pub fn restamp(&mut self, from: NodeId, to: NodeId, tick: u64) {
        self.origin = from;
        self.destination = to;
        self.arrival_tick = tick;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::new(0)
    }

    #[test]
    fn test_split_preserves_total_size() {
        let mut task = Task::new(ApplicationKind::Nlp, 500.0, node(), 3);
        let cont = task.split_off(300.0);
        assert_eq!(cont.size_bits(), 300.0);
        assert_eq!(task.size_bits(), 200.0);
        assert_eq!(cont.size_bits() + task.size_bits(), 500.0);
        assert_eq!(cont.application(), ApplicationKind::Nlp);
        assert_ne!(cont.id(), task.id());
    }

    #[test]
    fn test_shrink_clamps_at_zero() {
        let mut task = Task::new(ApplicationKind::Vr, 100.0, node(), 0);
        task.shrink(100.0);
        assert_eq!(task.size_bits(), 0.0);
    }

    #[test]
    fn test_restamp_updates_endpoints_and_tick() {
        let mut task = Task::new(ApplicationKind::Ar, 64.0, NodeId::new(1), 7);
        task.restamp(NodeId::new(1), NodeId::new(2), 9);
        assert_eq!(task.origin(), NodeId::new(1));
        assert_eq!(task.destination(), NodeId::new(2));
        assert_eq!(task.arrival_tick(), 9);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new(ApplicationKind::Nlp, 1.0, node(), 0);
        let b = Task::new(ApplicationKind::Nlp, 1.0, node(), 0);
        assert_ne!(a.id(), b.id());
    }
}

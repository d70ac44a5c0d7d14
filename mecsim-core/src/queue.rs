//! Per-application FIFO task queue with admission control and partial service
//!
//! A queue admits whole tasks against a capacity bound and serves bits off
//! the front in arrival order. Compute service discards served bits;
//! transmission service turns them into continuation tasks to forward.

use std::collections::{BTreeMap, VecDeque};

use crate::config::{ApplicationKind, APP_SLOTS};
use crate::task::{Task, TaskId};

// ============================================================================
// Arrival history
// ============================================================================

/// One tick's worth of admitted arrivals.
#[derive(Debug, Clone, Copy)]
struct ArrivalRecord {
    tick: u64,
    count: u32,
    bits: f64,
}

/// Bounded ring of per-tick arrival records, used for the mean-arrival-rate
/// estimate in observations.
#[derive(Debug, Clone, Default)]
pub struct ArrivalHistory {
    records: VecDeque<ArrivalRecord>,
    capacity: usize,
}

impl ArrivalHistory {
    /// Creates a history retaining at most `capacity` distinct ticks.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records `bits` admitted at `tick`. Records for the same tick merge.
    pub fn record(&mut self, tick: u64, bits: f64) {
        match self.records.back_mut() {
            Some(last) if last.tick == tick => {
                last.count += 1;
                last.bits += bits;
            }
            _ => {
                if self.records.len() == self.capacity {
                    self.records.pop_front();
                }
                self.records.push_back(ArrivalRecord { tick, count: 1, bits });
            }
        }
    }

    /// Average bits admitted per tick over the `window` ticks ending at
    /// `now`, divided by `scale`.
    pub fn mean_rate(&self, now: u64, window: u64, scale: f64) -> f64 {
        if window == 0 {
            return 0.0;
        }
        let from = now.saturating_sub(window - 1);
        let total: f64 = self
            .records
            .iter()
            .filter(|r| r.tick >= from && r.tick <= now)
            .map(|r| r.bits)
            .sum();
        total / window as f64 / scale
    }

    /// Bits admitted exactly at `now`, divided by `scale`; 0 if none.
    pub fn last(&self, now: u64, scale: f64) -> f64 {
        self.records
            .iter()
            .rev()
            .find(|r| r.tick == now)
            .map_or(0.0, |r| r.bits / scale)
    }
}

// ============================================================================
// Task queue
// ============================================================================

/// FIFO of tasks bounded by a bit capacity.
///
/// Edge nodes hold one queue per application; the cloud holds a single
/// aggregate queue (`application == None`) that mixes types.
#[derive(Debug)]
pub struct TaskQueue {
    application: Option<ApplicationKind>,
    capacity_bits: f64,
    tasks: VecDeque<Task>,
    arrivals: ArrivalHistory,
}

impl TaskQueue {
    /// Creates a queue for a single application type.
    pub fn for_application(
        application: ApplicationKind,
        capacity_bits: f64,
        history_window: usize,
    ) -> Self {
        Self {
            application: Some(application),
            capacity_bits,
            tasks: VecDeque::new(),
            arrivals: ArrivalHistory::new(history_window),
        }
    }

    /// Creates an aggregate queue accepting any application type.
    pub fn aggregate(capacity_bits: f64, history_window: usize) -> Self {
        Self {
            application: None,
            capacity_bits,
            tasks: VecDeque::new(),
            arrivals: ArrivalHistory::new(history_window),
        }
    }

    /// Application type this queue serves, if it is type-bound.
    pub fn application(&self) -> Option<ApplicationKind> {
        self.application
    }

    /// Current backlog in bits, divided by `scale`.
    pub fn length(&self, scale: f64) -> f64 {
        self.tasks.iter().map(Task::size_bits).sum::<f64>() / scale
    }

    /// Backlog in bits.
    pub fn length_bits(&self) -> f64 {
        self.length(1.0)
    }

    /// Capacity bound in bits.
    pub fn max_capacity(&self) -> f64 {
        self.capacity_bits
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Backlog broken down by application slot, divided by `scale`. Only
    /// meaningful for the aggregate queue; a type-bound queue fills one slot.
    pub fn lengths_by_slot(&self, scale: f64) -> [f64; APP_SLOTS] {
        let mut out = [0.0; APP_SLOTS];
        for task in &self.tasks {
            out[task.application().slot()] += task.size_bits() / scale;
        }
        out
    }

    /// Attempts to admit `task` at `tick`.
    ///
    /// Rejects without mutation when the backlog plus the task would exceed
    /// capacity; otherwise appends and records the arrival.
    pub fn admit(&mut self, task: Task, tick: u64) -> bool {
        if self.length_bits() + task.size_bits() > self.capacity_bits {
            return false;
        }
        self.arrivals.record(tick, task.size_bits());
        self.tasks.push_back(task);
        true
    }

    /// Consumes up to `budget_bits` off the front for local compute. Served
    /// bits are discarded (their work is done). Returns the bits served,
    /// never exceeding either the budget or the backlog. Empty queue or zero
    /// budget is a no-op.
    pub fn serve_for_compute(&mut self, budget_bits: f64) -> f64 {
        self.serve_for_compute_tracked(budget_bits, &mut BTreeMap::new())
    }

    /// As [`Self::serve_for_compute`], additionally accumulating served bits
    /// per application into `usage`. The aggregate cloud queue uses this to
    /// keep its observations application-indexed.
    pub fn serve_for_compute_tracked(
        &mut self,
        budget_bits: f64,
        usage: &mut BTreeMap<ApplicationKind, f64>,
    ) -> f64 {
        let mut remaining = budget_bits.max(0.0);
        let mut served = 0.0;
        while remaining > 0.0 {
            let Some(head) = self.tasks.front_mut() else { break };
            let app = head.application();
            if head.size_bits() <= remaining {
                let bits = head.size_bits();
                remaining -= bits;
                served += bits;
                *usage.entry(app).or_insert(0.0) += bits;
                self.tasks.pop_front();
            } else {
                head.shrink(remaining);
                served += remaining;
                *usage.entry(app).or_insert(0.0) += remaining;
                remaining = 0.0;
            }
        }
        served
    }

    /// Consumes up to `budget_bits` off the front for transmission. Unlike
    /// compute service the consumed bits survive: each consumed (possibly
    /// split) task becomes a continuation task keyed by id, to be handed to
    /// the receiving node. Splitting conserves total size.
    pub fn serve_for_transmission(&mut self, budget_bits: f64) -> (f64, BTreeMap<TaskId, Task>) {
        let mut remaining = budget_bits.max(0.0);
        let mut served = 0.0;
        let mut continuations = BTreeMap::new();
        while remaining > 0.0 {
            let Some(head) = self.tasks.front_mut() else { break };
            if head.size_bits() <= remaining {
                remaining -= head.size_bits();
                served += head.size_bits();
                if let Some(task) = self.tasks.pop_front() {
                    continuations.insert(task.id(), task);
                }
            } else {
                let cont = head.split_off(remaining);
                served += remaining;
                remaining = 0.0;
                continuations.insert(cont.id(), cont);
            }
        }
        (served, continuations)
    }

    /// Mean bits admitted per tick over the `window` ticks ending at `now`,
    /// divided by `scale`.
    pub fn mean_arrival_rate(&self, now: u64, window: u64, scale: f64) -> f64 {
        self.arrivals.mean_rate(now, window, scale)
    }

    /// Bits admitted exactly at `now`, divided by `scale`.
    pub fn last_arrival(&self, now: u64, scale: f64) -> f64 {
        self.arrivals.last(now, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    fn task(bits: f64) -> Task {
        Task::new(ApplicationKind::Nlp, bits, NodeId::new(0), 0)
    }

    fn queue(capacity: f64) -> TaskQueue {
        TaskQueue::for_application(ApplicationKind::Nlp, capacity, 100)
    }

    #[test]
    fn test_admit_rejects_oversized_task_without_mutation() {
        let mut q = queue(1000.0);
        assert!(!q.admit(task(1500.0), 0));
        assert_eq!(q.length_bits(), 0.0);
        assert!(q.is_empty());
    }

    #[test]
    fn test_admit_respects_capacity_across_tasks() {
        let mut q = queue(1000.0);
        assert!(q.admit(task(600.0), 0));
        assert!(!q.admit(task(500.0), 0));
        assert!(q.admit(task(400.0), 0));
        assert_eq!(q.length_bits(), 1000.0);
        assert!(q.length_bits() <= q.max_capacity());
    }

    #[test]
    fn test_serve_for_compute_partial() {
        let mut q = queue(10_000.0);
        assert!(q.admit(task(500.0), 0));
        let served = q.serve_for_compute(300.0);
        assert_eq!(served, 300.0);
        assert_eq!(q.length_bits(), 200.0);
    }

    #[test]
    fn test_serve_never_exceeds_backlog() {
        let mut q = queue(10_000.0);
        assert!(q.admit(task(500.0), 0));
        let served = q.serve_for_compute(1000.0);
        assert_eq!(served, 500.0);
        assert!(q.is_empty());
    }

    #[test]
    fn test_serve_empty_queue_is_noop() {
        let mut q = queue(10_000.0);
        assert_eq!(q.serve_for_compute(100.0), 0.0);
        let (served, continuations) = q.serve_for_transmission(100.0);
        assert_eq!(served, 0.0);
        assert!(continuations.is_empty());
    }

    #[test]
    fn test_zero_budget_is_noop() {
        let mut q = queue(10_000.0);
        assert!(q.admit(task(500.0), 0));
        assert_eq!(q.serve_for_compute(0.0), 0.0);
        assert_eq!(q.length_bits(), 500.0);
    }

    #[test]
    fn test_serve_consumes_in_fifo_order() {
        let mut q = queue(10_000.0);
        assert!(q.admit(task(100.0), 0));
        assert!(q.admit(task(200.0), 1));
        // 150 bits: first task fully, 50 off the second.
        assert_eq!(q.serve_for_compute(150.0), 150.0);
        assert_eq!(q.length_bits(), 150.0);
    }

    #[test]
    fn test_transmission_split_conserves_size() {
        let mut q = queue(10_000.0);
        assert!(q.admit(task(500.0), 0));
        let (served, continuations) = q.serve_for_transmission(300.0);
        assert_eq!(served, 300.0);
        assert_eq!(continuations.len(), 1);
        let forwarded: f64 = continuations.values().map(Task::size_bits).sum();
        assert_eq!(forwarded, 300.0);
        assert_eq!(forwarded + q.length_bits(), 500.0);
    }

    #[test]
    fn test_transmission_moves_whole_tasks_with_identity() {
        let mut q = queue(10_000.0);
        let t = task(100.0);
        let id = t.id();
        assert!(q.admit(t, 0));
        let (served, continuations) = q.serve_for_transmission(100.0);
        assert_eq!(served, 100.0);
        assert!(continuations.contains_key(&id));
        assert!(q.is_empty());
    }

    #[test]
    fn test_arrival_statistics() {
        let mut q = queue(1_000_000.0);
        assert!(q.admit(task(100.0), 5));
        assert!(q.admit(task(300.0), 5));
        assert!(q.admit(task(200.0), 7));
        assert_eq!(q.last_arrival(5, 1.0), 400.0);
        assert_eq!(q.last_arrival(6, 1.0), 0.0);
        assert_eq!(q.last_arrival(7, 1.0), 200.0);
        // Ticks 4..=7 hold 600 bits over a window of 4.
        assert_eq!(q.mean_arrival_rate(7, 4, 1.0), 150.0);
        // A window missing tick 5 sees only the 200-bit arrival.
        assert_eq!(q.mean_arrival_rate(7, 2, 1.0), 100.0);
    }

    #[test]
    fn test_arrival_history_ring_is_bounded() {
        let mut history = ArrivalHistory::new(3);
        for tick in 0..10 {
            history.record(tick, 1.0);
        }
        assert_eq!(history.records.len(), 3);
        assert_eq!(history.last(9, 1.0), 1.0);
        assert_eq!(history.last(0, 1.0), 0.0);
    }

    #[test]
    fn test_aggregate_queue_tracks_per_slot_lengths() {
        let mut q = TaskQueue::aggregate(10_000.0, 100);
        assert!(q.admit(Task::new(ApplicationKind::SpeechRecognition, 100.0, NodeId::new(0), 0), 0));
        assert!(q.admit(Task::new(ApplicationKind::FaceRecognition, 50.0, NodeId::new(0), 0), 0));
        let slots = q.lengths_by_slot(1.0);
        assert_eq!(slots[ApplicationKind::SpeechRecognition.slot()], 100.0);
        assert_eq!(slots[ApplicationKind::FaceRecognition.slot()], 50.0);
        assert_eq!(slots[ApplicationKind::Nlp.slot()], 0.0);
    }
}

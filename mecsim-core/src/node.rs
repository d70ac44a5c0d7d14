//! Edge and cloud compute nodes
//!
//! An edge node owns one task queue per application it serves, generates
//! stochastic arrivals, spends a controllable fraction of its capability on
//! local compute, and offloads backlog to its higher-tier neighbor through a
//! two-phase propose/probe/commit handshake. The cloud node holds a single
//! aggregate queue and always applies its full capability.

use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::config::{ApplicationKind, APP_SLOTS, GHZ, KB};
use crate::error::{Error, Result};
use crate::queue::{ArrivalHistory, TaskQueue};
use crate::task::{Task, TaskId};

/// Small integer node handle issued by the topology registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Outcome of one edge node's offload attempt toward one target.
#[derive(Debug, Default)]
pub struct OffloadReport {
    /// Bits actually committed for transmission this tick.
    pub transmitted: f64,
    /// Continuation tasks to hand to the target's arrival handler.
    pub tasks: BTreeMap<TaskId, Task>,
    /// Applications whose full proposal the probe rejected. Rejected backlog
    /// stays queued; no retry happens within the tick.
    pub rejected: Vec<ApplicationKind>,
}

// ============================================================================
// Edge node
// ============================================================================

/// Edge device: per-application queues, stochastic arrivals, partial local
/// compute, and offload toward a linked cloud node.
#[derive(Debug)]
pub struct EdgeNode {
    id: NodeId,
    computational_capability: f64,
    queues: BTreeMap<ApplicationKind, TaskQueue>,
    links_to_higher: BTreeMap<NodeId, Channel>,
    cpu_used: BTreeMap<ApplicationKind, f64>,
    arrival_window: u64,
}

impl EdgeNode {
    /// Creates an edge node with `computational_capability` bits/tick and no
    /// queues yet.
    pub fn new(id: NodeId, computational_capability: f64, arrival_window: u64) -> Self {
        Self {
            id,
            computational_capability,
            queues: BTreeMap::new(),
            links_to_higher: BTreeMap::new(),
            cpu_used: BTreeMap::new(),
            arrival_window,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Bits/tick of local compute capability.
    pub fn computational_capability(&self) -> f64 {
        self.computational_capability
    }

    /// Creates one queue per application, each bounded by `capacity_bits`.
    pub fn make_application_queues(&mut self, applications: &[ApplicationKind], capacity_bits: f64) {
        for &app in applications {
            self.queues.insert(
                app,
                TaskQueue::for_application(app, capacity_bits, self.arrival_window as usize),
            );
            self.cpu_used.insert(app, 0.0);
        }
    }

    /// Applications this node serves, in stable (discriminant) order.
    pub fn applications(&self) -> impl Iterator<Item = ApplicationKind> + '_ {
        self.queues.keys().copied()
    }

    pub fn application_count(&self) -> usize {
        self.queues.len()
    }

    /// Registers the uplink channel toward a higher-tier neighbor.
    pub fn add_link_to_higher(&mut self, neighbor: NodeId, channel: Channel) {
        self.links_to_higher.insert(neighbor, channel);
    }

    /// Higher-tier neighbor handles, in stable order.
    pub fn higher_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links_to_higher.keys().copied()
    }

    /// Samples the channel toward `neighbor` in the given direction.
    pub fn sample_channel_rate(&self, neighbor: NodeId, rng: &mut impl Rng) -> Result<f64> {
        let channel = self
            .links_to_higher
            .get(&neighbor)
            .ok_or(Error::UnknownNode(neighbor))?;
        Ok(channel.sample_rate(true, rng))
    }

    /// Per-queue backlog in stable application order, divided by `scale`.
    pub fn queue_lengths(&self, scale: f64) -> Vec<f64> {
        self.queues.values().map(|q| q.length(scale)).collect()
    }

    /// Direct access to one application queue.
    pub fn queue(&self, app: ApplicationKind) -> Option<&TaskQueue> {
        self.queues.get(&app)
    }

    /// Spends `alpha[i] * capability` bits of compute on the i-th managed
    /// application queue, in stable application order. The caller is
    /// responsible for `alpha` summing to at most 1 (normalization happens
    /// upstream); this records the bits actually served per application and
    /// returns their sum.
    pub fn do_tasks(&mut self, alpha: &[f64]) -> f64 {
        debug_assert_eq!(alpha.len(), self.queues.len());
        let mut total = 0.0;
        for ((app, queue), &fraction) in self.queues.iter_mut().zip(alpha) {
            let served = if fraction > 0.0 && !queue.is_empty() {
                queue.serve_for_compute(fraction * self.computational_capability)
            } else {
                0.0
            };
            self.cpu_used.insert(*app, served);
            total += served;
        }
        trace!(node = %self.id, served_bits = total, "local compute");
        total
    }

    /// Draws one tick of Poisson arrivals for every served application.
    ///
    /// The per-application mean is `task_rate * popularity`, in units of
    /// `arrival_bits`. A zero draw means no arrival. Admission failures are
    /// counted, not raised. Returns the arrival sizes (slot-indexed, recorded
    /// whether or not admission succeeded) and the failure count.
    pub fn random_task_generation(
        &mut self,
        task_rate: f64,
        tick: u64,
        rng: &mut impl Rng,
    ) -> ([f64; APP_SLOTS], u32) {
        let mut arrival_sizes = [0.0; APP_SLOTS];
        let mut failed_to_generate = 0;
        let id = self.id;
        for (&app, queue) in &mut self.queues {
            let mean = task_rate * app.popularity();
            if mean <= 0.0 {
                continue;
            }
            let Ok(poisson) = Poisson::new(mean) else { continue };
            let count: f64 = poisson.sample(rng);
            let data_size = count * app.arrival_bits();
            if data_size <= 0.0 {
                continue;
            }
            arrival_sizes[app.slot()] = data_size;
            let task = Task::new(app, data_size, id, tick);
            if !queue.admit(task, tick) {
                failed_to_generate += 1;
                debug!(node = %id, app = %app, bits = data_size, "generation overflow");
            }
        }
        (arrival_sizes, failed_to_generate)
    }

    /// Two-phase offload toward `target` over the registered uplink.
    ///
    /// Propose: per application, `min(backlog, beta[i] * sampled_rate)`
    /// truncated to whole bits. Probe: the target admits each proposal
    /// all-or-nothing against its aggregate capacity. Commit: admitted
    /// amounts are served for transmission, yielding continuation tasks for
    /// the caller to deliver. Rejection is an expected outcome, reported in
    /// the result, never an error.
    pub fn offload_tasks(
        &mut self,
        beta: &[f64],
        target: &CloudNode,
        rng: &mut impl Rng,
    ) -> Result<OffloadReport> {
        debug_assert_eq!(beta.len(), self.queues.len());
        let channel = self
            .links_to_higher
            .get(&target.id())
            .ok_or(Error::UnknownNode(target.id()))?;
        let rate = channel.sample_rate(true, rng);

        let mut report = OffloadReport::default();
        for ((&app, queue), &fraction) in self.queues.iter_mut().zip(beta) {
            let proposal = queue.length_bits().min(fraction * rate).trunc();
            let (admitted, rejected) = target.probe(proposal);
            if rejected {
                report.rejected.push(app);
                continue;
            }
            if admitted > 0.0 && !queue.is_empty() {
                let (bits, continuations) = queue.serve_for_transmission(admitted);
                report.transmitted += bits;
                report.tasks.extend(continuations);
            }
        }
        trace!(
            node = %self.id,
            target = %target.id(),
            bits = report.transmitted,
            rejected = report.rejected.len(),
            "offload"
        );
        Ok(report)
    }

    /// Observation block: five application-indexed 8-slot vectors — mean
    /// estimated arrival rate, last-tick arrival, queue length, cpu-used
    /// fraction, and static workload metadata.
    pub fn status(&self, tick: u64, scale: f64) -> Vec<f64> {
        let mut estimated = [0.0; APP_SLOTS];
        let mut arrivals = [0.0; APP_SLOTS];
        let mut lengths = [0.0; APP_SLOTS];
        let mut cpu_used = [0.0; APP_SLOTS];
        let mut app_info = [0.0; APP_SLOTS];
        for (&app, queue) in &self.queues {
            let slot = app.slot();
            estimated[slot] = queue.mean_arrival_rate(tick, self.arrival_window, GHZ);
            arrivals[slot] = queue.last_arrival(tick, GHZ);
            lengths[slot] = queue.length(scale);
            cpu_used[slot] = self.cpu_used[&app] / self.computational_capability;
            app_info[slot] = app.workload() / KB;
        }
        let mut out = Vec::with_capacity(5 * APP_SLOTS);
        out.extend_from_slice(&estimated);
        out.extend_from_slice(&arrivals);
        out.extend_from_slice(&lengths);
        out.extend_from_slice(&cpu_used);
        out.extend_from_slice(&app_info);
        out
    }
}

// ============================================================================
// Cloud node
// ============================================================================

/// Cloud tier: a single aggregate queue served at full capability each tick.
#[derive(Debug)]
pub struct CloudNode {
    id: NodeId,
    computational_capability: f64,
    queue: TaskQueue,
    links_to_lower: BTreeMap<NodeId, Channel>,
    cpu_used: BTreeMap<ApplicationKind, f64>,
    arrivals: BTreeMap<ApplicationKind, ArrivalHistory>,
    arrival_window: u64,
}

impl CloudNode {
    /// Creates a cloud node with an aggregate queue of `capacity_bits`.
    pub fn new(
        id: NodeId,
        computational_capability: f64,
        capacity_bits: f64,
        arrival_window: u64,
    ) -> Self {
        Self {
            id,
            computational_capability,
            queue: TaskQueue::aggregate(capacity_bits, arrival_window as usize),
            links_to_lower: BTreeMap::new(),
            cpu_used: BTreeMap::new(),
            arrivals: BTreeMap::new(),
            arrival_window,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn computational_capability(&self) -> f64 {
        self.computational_capability
    }

    /// Registers the downlink channel toward a lower-tier neighbor.
    pub fn add_link_to_lower(&mut self, neighbor: NodeId, channel: Channel) {
        self.links_to_lower.insert(neighbor, channel);
    }

    /// Samples the channel toward `neighbor` (downlink direction).
    pub fn sample_channel_rate(&self, neighbor: NodeId, rng: &mut impl Rng) -> Result<f64> {
        let channel = self
            .links_to_lower
            .get(&neighbor)
            .ok_or(Error::UnknownNode(neighbor))?;
        Ok(channel.sample_rate(false, rng))
    }

    /// Aggregate backlog divided by `scale`.
    pub fn queue_length(&self, scale: f64) -> f64 {
        self.queue.length(scale)
    }

    /// Admission probe: accepts the full `bits` if it fits the aggregate
    /// queue, otherwise rejects the whole amount. A zero proposal is admitted
    /// (as zero) without counting as a rejection.
    pub fn probe(&self, bits: f64) -> (f64, bool) {
        if self.queue.length_bits() + bits > self.queue.max_capacity() {
            (0.0, true)
        } else {
            (bits, false)
        }
    }

    /// Arrival handler for probed continuation tasks. Re-stamps each task
    /// (forwarder becomes origin, this node the destination, arrival tick
    /// reset) and admits it. Admission has already been probed; failures can
    /// still occur when several applications were probed against the same
    /// free space, and are counted, not raised.
    pub fn deliver(&mut self, tasks: BTreeMap<TaskId, Task>, tick: u64) -> u32 {
        let mut failed = 0;
        for (_, mut task) in tasks {
            let app = task.application();
            let bits = task.size_bits();
            task.restamp(task.destination(), self.id, tick);
            if self.queue.admit(task, tick) {
                self.arrivals
                    .entry(app)
                    .or_insert_with(|| ArrivalHistory::new(self.arrival_window as usize))
                    .record(tick, bits);
            } else {
                failed += 1;
                debug!(node = %self.id, app = %app, bits, "offloaded task rejected at delivery");
            }
        }
        failed
    }

    /// Applies the full computational capability to the aggregate queue.
    /// Records per-application usage for the observation block and returns
    /// the total bits served.
    pub fn do_tasks(&mut self) -> f64 {
        self.cpu_used.clear();
        let served = self
            .queue
            .serve_for_compute_tracked(self.computational_capability, &mut self.cpu_used);
        trace!(node = %self.id, served_bits = served, "cloud compute");
        served
    }

    /// Observation block: four application-indexed 8-slot vectors — mean
    /// estimated arrival rate, last-tick arrival, queued bits, cpu-used
    /// fraction.
    pub fn status(&self, tick: u64, scale: f64) -> Vec<f64> {
        let mut estimated = [0.0; APP_SLOTS];
        let mut arrivals = [0.0; APP_SLOTS];
        let mut cpu_used = [0.0; APP_SLOTS];
        for (&app, history) in &self.arrivals {
            estimated[app.slot()] = history.mean_rate(tick, self.arrival_window, GHZ);
            arrivals[app.slot()] = history.last(tick, GHZ);
        }
        for (&app, &bits) in &self.cpu_used {
            cpu_used[app.slot()] = bits / self.computational_capability;
        }
        let lengths = self.queue.lengths_by_slot(scale);
        let mut out = Vec::with_capacity(4 * APP_SLOTS);
        out.extend_from_slice(&estimated);
        out.extend_from_slice(&arrivals);
        out.extend_from_slice(&lengths);
        out.extend_from_slice(&cpu_used);
        out
    }
}

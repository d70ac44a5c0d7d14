//! Environment: topology arena and the per-tick step pipeline
//!
//! The environment owns the full topology and drives each tick through a
//! fixed phase order: generation, local compute, offload, cost evaluation,
//! advance. It exposes the episodic `reset`/`step` interface consumed by an
//! external training loop.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::config::{ChannelKind, SimConfig, APP_SLOTS, GHZ};
use crate::error::{Error, Result};
use crate::node::{CloudNode, EdgeNode, NodeId};
use crate::task::{Task, TaskId};

/// Backlog threshold of the drift cost, in the same (GHz-scaled) unit as the
/// post-compute backlog vector.
pub const BACKLOG_THRESHOLD: f64 = 0.002;

/// Non-fatal failure counters accumulated across an episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Stochastic arrivals dropped because their queue was full.
    pub failed_to_generate: u64,
    /// Offload proposals rejected by the admission probe, plus the rare
    /// delivery failures when several probed applications raced for the same
    /// free space.
    pub failed_to_offload: u64,
}

/// Per-step info payload. Structured but deliberately empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepInfo {}

/// Result of one environment step.
#[derive(Debug)]
pub struct StepOutcome {
    /// Post-step observation vector.
    pub observation: Vec<f64>,
    /// Negated scalar cost.
    pub reward: f64,
    /// True exactly when the tick counter has reached the episode length.
    pub done: bool,
    /// Empty info payload.
    pub info: StepInfo,
}

/// Stored topology seed for rebuilding on reset.
#[derive(Debug, Clone, Copy)]
struct PairSpec {
    edge_capability: f64,
    cloud_capability: f64,
    channel: ChannelKind,
}

/// Two-tier edge/cloud topology with an episodic step interface.
#[derive(Debug)]
pub struct Environment {
    config: SimConfig,
    clients: Vec<EdgeNode>,
    servers: Vec<CloudNode>,
    links: Vec<(NodeId, NodeId)>,
    tick: u64,
    next_node_id: u32,
    rng: StdRng,
    diagnostics: Diagnostics,
    reset_info: Vec<PairSpec>,
}

impl Environment {
    /// Validates `config`, builds the topology, and seeds the RNG.
    pub fn new(config: SimConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let reset_info = vec![PairSpec {
            edge_capability: config.edge_capability(),
            cloud_capability: config.cloud_capability(),
            channel: config.channel,
        }];
        let mut env = Self {
            config,
            clients: Vec::new(),
            servers: Vec::new(),
            links: Vec::new(),
            tick: 0,
            next_node_id: 0,
            rng: StdRng::seed_from_u64(seed),
            diagnostics: Diagnostics::default(),
            reset_info,
        };
        env.rebuild();
        info!(
            clients = env.clients.len(),
            servers = env.servers.len(),
            links = env.links.len(),
            "topology built"
        );
        Ok(env)
    }

    /// Reseeds the RNG. Affects every subsequent draw (arrivals and channel
    /// samples).
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Discards the topology and rebuilds it from the stored configuration,
    /// returning the initial observation.
    pub fn reset(&mut self) -> Result<Vec<f64>> {
        self.tick = 0;
        self.diagnostics = Diagnostics::default();
        self.rebuild();
        self.observation()
    }

    fn rebuild(&mut self) {
        self.clients.clear();
        self.servers.clear();
        self.links.clear();
        self.next_node_id = 0;
        let pairs = self.reset_info.clone();
        for pair in pairs {
            self.init_linked_pair(pair);
        }
    }

    fn init_linked_pair(&mut self, pair: PairSpec) {
        let client_id = self.issue_node_id();
        let mut client = EdgeNode::new(client_id, pair.edge_capability, self.config.arrival_window);
        client.make_application_queues(&self.config.applications, self.config.edge_queue_capacity);
        self.clients.push(client);

        let server_id = self.issue_node_id();
        let server = CloudNode::new(
            server_id,
            pair.cloud_capability,
            self.config.cloud_queue_capacity,
            self.config.arrival_window,
        );
        self.servers.push(server);

        self.add_link(client_id, server_id, pair.channel);
    }

    fn issue_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn add_link(&mut self, client_id: NodeId, server_id: NodeId, channel: ChannelKind) {
        if let Some(client) = self.clients.iter_mut().find(|c| c.id() == client_id) {
            client.add_link_to_higher(server_id, Channel::new(channel));
        }
        if let Some(server) = self.servers.iter_mut().find(|s| s.id() == server_id) {
            server.add_link_to_lower(client_id, Channel::new(channel));
        }
        self.links.push((client_id, server_id));
    }

    /// Current tick counter.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Episode-level failure counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Static configuration in force.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Expected action vector length: edge allocations plus an idle slot,
    /// then offload allocations plus an idle slot.
    pub fn action_dim(&self) -> usize {
        2 * (self.config.applications.len() + 1)
    }

    /// Observation vector length.
    pub fn obs_dim(&self) -> usize {
        self.clients.len() * 5 * APP_SLOTS
            + self.servers.len() * 4 * APP_SLOTS
            + self.links.len() * 2
    }

    /// Per-queue edge backlog across all clients, divided by `scale`, in
    /// stable (client, application) order.
    pub fn edge_queue_lengths(&self, scale: f64) -> Vec<f64> {
        self.clients
            .iter()
            .flat_map(|c| c.queue_lengths(scale))
            .collect()
    }

    /// Aggregate cloud backlog per server, divided by `scale`.
    pub fn cloud_queue_lengths(&self, scale: f64) -> Vec<f64> {
        self.servers.iter().map(|s| s.queue_length(scale)).collect()
    }

    /// Assembles the observation vector: per-client status blocks, per-server
    /// status blocks, then a pair of sampled channel rates per link. Channel
    /// sampling draws from the environment RNG.
    pub fn observation(&mut self) -> Result<Vec<f64>> {
        let mut state = Vec::with_capacity(self.obs_dim());
        for client in &self.clients {
            state.extend(client.status(self.tick, GHZ));
        }
        for server in &self.servers {
            state.extend(server.status(self.tick, GHZ));
        }
        for i in 0..self.links.len() {
            let (client_id, server_id) = self.links[i];
            let client = self
                .clients
                .iter()
                .find(|c| c.id() == client_id)
                .ok_or(Error::UnknownNode(client_id))?;
            let server = self
                .servers
                .iter()
                .find(|s| s.id() == server_id)
                .ok_or(Error::UnknownNode(server_id))?;
            state.push(client.sample_channel_rate(server_id, &mut self.rng)?);
            state.push(server.sample_channel_rate(client_id, &mut self.rng)?);
        }
        Ok(state)
    }

    /// Advances the simulation by one tick.
    ///
    /// The action vector is `[edge_alloc.., edge_idle, offload_alloc..,
    /// offload_idle]`; each half is softmax-normalized before use and the
    /// idle slot is then dropped, so the applied fractions sum to at most 1.
    pub fn step(&mut self, action: &[f64]) -> Result<StepOutcome> {
        let expected = self.action_dim();
        if action.len() != expected {
            return Err(Error::Action(format!(
                "expected {expected} entries, got {}",
                action.len()
            )));
        }
        if action.iter().any(|a| !a.is_finite()) {
            return Err(Error::Action("non-finite entry".into()));
        }

        let half = expected / 2;
        let alpha_full = softmax(&action[..half]);
        let beta_full = softmax(&action[half..]);
        let apps = half - 1;
        let alpha = &alpha_full[..apps];
        let beta = &beta_full[..apps];

        // Phase 1: stochastic arrivals on every client.
        for client in &mut self.clients {
            let (_, failed) =
                client.random_task_generation(self.config.task_rate, self.tick, &mut self.rng);
            self.diagnostics.failed_to_generate += u64::from(failed);
        }

        // Phase 2: local compute under the edge allocation.
        let mut used_edge_cpus: BTreeMap<NodeId, f64> = BTreeMap::new();
        for client in &mut self.clients {
            used_edge_cpus.insert(client.id(), client.do_tasks(alpha));
        }

        // Cost input: edge backlog after local compute, before offload, in
        // GHz units.
        let after = self.edge_queue_lengths(GHZ);

        // Phase 3: offload. Commits mutate source queues immediately, but
        // continuations are buffered per server and applied at the phase
        // barrier, before cloud compute.
        let mut pending: BTreeMap<NodeId, BTreeMap<TaskId, Task>> = BTreeMap::new();
        for i in 0..self.links.len() {
            let (client_id, server_id) = self.links[i];
            let ci = self
                .clients
                .iter()
                .position(|c| c.id() == client_id)
                .ok_or(Error::UnknownNode(client_id))?;
            let si = self
                .servers
                .iter()
                .position(|s| s.id() == server_id)
                .ok_or(Error::UnknownNode(server_id))?;
            let report =
                self.clients[ci].offload_tasks(beta, &self.servers[si], &mut self.rng)?;
            self.diagnostics.failed_to_offload += report.rejected.len() as u64;
            pending.entry(server_id).or_default().extend(report.tasks);
        }
        let mut used_cloud_cpus: BTreeMap<NodeId, f64> = BTreeMap::new();
        for server in &mut self.servers {
            let tasks = pending.remove(&server.id()).unwrap_or_default();
            let failed = server.deliver(tasks, self.tick);
            self.diagnostics.failed_to_offload += u64::from(failed);
            used_cloud_cpus.insert(server.id(), server.do_tasks());
        }

        // Phase 4: cost evaluation.
        let cost = self.cost(&used_edge_cpus, &used_cloud_cpus, &after);
        let observation = self.observation()?;

        // Phase 5: advance.
        self.tick += 1;
        let done = self.tick >= self.config.max_episode_steps;
        debug!(tick = self.tick, cost, done, "step complete");
        if done {
            info!(
                tick = self.tick,
                failed_to_generate = self.diagnostics.failed_to_generate,
                failed_to_offload = self.diagnostics.failed_to_offload,
                "episode finished"
            );
        }

        Ok(StepOutcome {
            observation,
            reward: -cost,
            done,
            info: StepInfo::default(),
        })
    }

    /// Scalar tick cost: backlog drift plus weighted computation/payment.
    fn cost(
        &self,
        used_edge_cpus: &BTreeMap<NodeId, f64>,
        used_cloud_cpus: &BTreeMap<NodeId, f64>,
        after: &[f64],
    ) -> f64 {
        let edge_cores = f64::from(self.config.num_edge_cores);
        let cloud_cores = f64::from(self.config.num_cloud_cores);
        let edge_computation_cost: f64 = used_edge_cpus
            .values()
            .map(|&usage| processor_cost(edge_cores, usage))
            .sum();
        let cloud_payment_cost: f64 = used_cloud_cpus
            .values()
            .map(|&usage| processor_cost(cloud_cores, usage))
            .sum();
        drift_cost(after, BACKLOG_THRESHOLD)
            + self.config.cost_weight * (edge_computation_cost + cloud_payment_cost)
    }
}

/// Convex cubic utilization penalty for a processor with `cores` reference
/// cores running `usage` bits this tick.
pub fn processor_cost(cores: f64, usage: f64) -> f64 {
    cores * (usage / (400.0 * GHZ * cores)).powi(3)
}

/// Backlog drift penalty over the post-compute backlog vector.
///
/// `excess` is the total backlog above `threshold`. The penalty is
/// `(excess²)^10 · (−log10 excess) + excess` for positive excess and 0 at
/// zero. The log factor amplifies the term below excess 1 and flips sign
/// above it; that asymmetry is intended shaping and is kept as-is.
pub fn drift_cost(after: &[f64], threshold: f64) -> f64 {
    let excess: f64 = after.iter().map(|&q| (q - threshold).max(0.0)).sum();
    let mut cost = if excess > 0.0 {
        excess.powi(2).powi(10) * (-excess.log10())
    } else {
        excess.powi(2)
    };
    cost += excess;
    cost
}

/// Numerically stable softmax; the output sums to 1.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplicationKind;

    fn quiet_config() -> SimConfig {
        SimConfig {
            task_rate: 0.0,
            max_episode_steps: 10,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_softmax_sums_to_one() {
        for values in [vec![0.0; 4], vec![5.0, 3.0, 2.0, 9.0], vec![0.9, 0.8, 0.7, 0.6]] {
            let out = softmax(&values);
            let sum: f64 = out.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "sum was {sum}");
            assert!(out.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_drift_cost_closed_form() {
        // Backlog 0.003 against threshold 0.002.
        let excess = 0.003 - BACKLOG_THRESHOLD;
        let expected = excess.powi(2).powi(10) * (-excess.log10()) + excess;
        let actual = drift_cost(&[0.003], BACKLOG_THRESHOLD);
        assert!((actual - expected).abs() < 1e-15);
        // Dominated by the linear continuity term at this magnitude.
        assert!((actual - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_drift_cost_zero_at_or_below_threshold() {
        assert_eq!(drift_cost(&[0.0], BACKLOG_THRESHOLD), 0.0);
        assert_eq!(drift_cost(&[0.002], BACKLOG_THRESHOLD), 0.0);
        assert_eq!(drift_cost(&[0.001, 0.0015], BACKLOG_THRESHOLD), 0.0);
    }

    #[test]
    fn test_processor_cost_is_cubic() {
        assert_eq!(processor_cost(10.0, 0.0), 0.0);
        let base = processor_cost(10.0, 100.0 * GHZ);
        let double = processor_cost(10.0, 200.0 * GHZ);
        assert!((double / base - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_action_shape_is_enforced() {
        let mut env = Environment::new(quiet_config(), 0).unwrap();
        assert_eq!(env.action_dim(), 8);
        assert!(matches!(env.step(&[0.0; 7]), Err(Error::Action(_))));
        assert!(matches!(env.step(&[f64::NAN; 8]), Err(Error::Action(_))));
        assert!(env.step(&[0.0; 8]).is_ok());
    }

    #[test]
    fn test_idle_tick_costs_nothing() {
        let mut env = Environment::new(quiet_config(), 0).unwrap();
        let outcome = env.step(&[0.0; 8]).unwrap();
        assert_eq!(outcome.reward, 0.0);
        assert!(!outcome.done);
        assert_eq!(env.diagnostics(), Diagnostics::default());
    }

    #[test]
    fn test_observation_dimension() {
        let mut env = Environment::new(quiet_config(), 0).unwrap();
        // 1 client (5 blocks) + 1 server (4 blocks) + 1 link pair.
        assert_eq!(env.obs_dim(), 5 * APP_SLOTS + 4 * APP_SLOTS + 2);
        let obs = env.observation().unwrap();
        assert_eq!(obs.len(), env.obs_dim());
    }

    #[test]
    fn test_workload_metadata_block_is_static() {
        let mut env = Environment::new(quiet_config(), 0).unwrap();
        let obs = env.observation().unwrap();
        let nlp = ApplicationKind::Nlp;
        assert_eq!(
            obs[4 * APP_SLOTS + nlp.slot()],
            nlp.workload() / crate::config::KB
        );
    }

    #[test]
    fn test_steps_are_reproducible_under_same_seed() {
        let config = SimConfig {
            max_episode_steps: 20,
            ..SimConfig::default()
        };
        let mut a = Environment::new(config.clone(), 7).unwrap();
        let mut b = Environment::new(config, 7).unwrap();
        let action = [0.3, -0.5, 1.0, 0.0, 0.2, 0.2, -1.0, 0.4];
        for _ in 0..20 {
            let oa = a.step(&action).unwrap();
            let ob = b.step(&action).unwrap();
            assert_eq!(oa.reward, ob.reward);
            assert_eq!(oa.observation, ob.observation);
        }
    }

    #[test]
    fn test_reset_rebuilds_topology() {
        let mut env = Environment::new(SimConfig::default(), 1).unwrap();
        for _ in 0..5 {
            env.step(&[0.1; 8]).unwrap();
        }
        assert_eq!(env.tick(), 5);
        let obs = env.reset().unwrap();
        assert_eq!(env.tick(), 0);
        assert_eq!(obs.len(), env.obs_dim());
        assert!(env.edge_queue_lengths(1.0).iter().all(|&q| q == 0.0));
        assert!(env.cloud_queue_lengths(1.0).iter().all(|&q| q == 0.0));
        assert_eq!(env.diagnostics(), Diagnostics::default());
    }
}

//! Core simulation model for the mecsim testbed
//!
//! Models a two-tier mobile-edge-computing system: edge devices hold
//! per-application task queues, process a controllable fraction of backlog
//! each tick, and offload the remainder over a rate-limited channel to a
//! cloud tier. The [`env::Environment`] drives the per-tick pipeline and
//! exposes the episodic `reset`/`step` interface used by training loops.
//!
//! Time is a discrete tick counter; the whole pipeline is single-threaded
//! and synchronous. All randomness flows through one seeded generator, so a
//! fixed seed reproduces an episode exactly.

pub mod channel;
pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod node;
pub mod queue;
pub mod task;

pub use channel::Channel;
pub use config::{ApplicationKind, ChannelKind, SimConfig, APP_SLOTS, GB, GHZ, KB, MB};
pub use env::{
    drift_cost, processor_cost, softmax, Diagnostics, Environment, StepInfo, StepOutcome,
    BACKLOG_THRESHOLD,
};
pub use error::{Error, Result};
pub use logging::{init_logging, LogLevel};
pub use node::{CloudNode, EdgeNode, NodeId, OffloadReport};
pub use queue::{ArrivalHistory, TaskQueue};
pub use task::{Task, TaskId};

//! Error types for mecsim
//!
//! Only caller-contract violations surface as errors. Queue overflow and
//! offload rejection are simulated physical conditions; they are reported as
//! counters and folded into the cost, never raised here.

use thiserror::Error;

use crate::node::NodeId;

/// Error types for the mecsim library.
#[derive(Debug, Error)]
pub enum Error {
    /// Topology or constants misconfiguration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed action vector (wrong length or non-finite entries).
    #[error("invalid action vector: {0}")]
    Action(String),

    /// A link references a node handle the topology does not contain.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Configuration file I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

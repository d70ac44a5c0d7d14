//! Static configuration for the mecsim testbed
//!
//! One immutable [`SimConfig`] value is built at startup (defaults, or a YAML
//! file) and threaded explicitly into the topology builder and the cost
//! function. Nothing in the simulation reads ambient state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Unit scales
// ============================================================================

/// Bits per byte.
pub const BYTE: f64 = 8.0;
/// Bits per kilobyte.
pub const KB: f64 = 1024.0 * BYTE;
/// Bits per megabyte.
pub const MB: f64 = 1024.0 * KB;
/// Bits per gigabyte.
pub const GB: f64 = 1024.0 * MB;

/// Clock frequency scales (cycles per second).
pub const KHZ: f64 = 1e3;
pub const MHZ: f64 = KHZ * 1e3;
pub const GHZ: f64 = MHZ * 1e3;

/// Transmission rate scales (bits per second).
pub const KBPS: f64 = 1e3;
pub const MBPS: f64 = KBPS * 1e3;
pub const GBPS: f64 = MBPS * 1e3;

/// Number of application slots in every observation block. Application
/// discriminants are 1-indexed; slot `kind as usize - 1` holds the value and
/// unused slots stay zero.
pub const APP_SLOTS: usize = 8;

// ============================================================================
// Application catalog
// ============================================================================

/// Workload categories an edge device can generate.
///
/// Discriminants are stable and 1-indexed; they select the observation slot
/// for every application-indexed quantity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ApplicationKind {
    SpeechRecognition = 1,
    Nlp = 2,
    FaceRecognition = 3,
    SearchRequest = 4,
    LanguageTranslation = 5,
    Proc3dGame = 6,
    Vr = 7,
    Ar = 8,
}

impl ApplicationKind {
    /// All catalog members, in discriminant order.
    pub const ALL: [ApplicationKind; 8] = [
        ApplicationKind::SpeechRecognition,
        ApplicationKind::Nlp,
        ApplicationKind::FaceRecognition,
        ApplicationKind::SearchRequest,
        ApplicationKind::LanguageTranslation,
        ApplicationKind::Proc3dGame,
        ApplicationKind::Vr,
        ApplicationKind::Ar,
    ];

    /// Observation slot for this application (discriminant − 1).
    pub fn slot(self) -> usize {
        self as usize - 1
    }

    /// Processing workload in cycles per bit. Surfaced in observations as
    /// `workload() / KB`.
    pub fn workload(self) -> f64 {
        match self {
            ApplicationKind::SpeechRecognition => 10_435.0,
            ApplicationKind::Nlp => 25_346.0,
            ApplicationKind::FaceRecognition => 45_043.0,
            ApplicationKind::SearchRequest => 8_405.0,
            ApplicationKind::LanguageTranslation => 34_252.0,
            ApplicationKind::Proc3dGame => 54_633.0,
            ApplicationKind::Vr => 40_305.0,
            ApplicationKind::Ar => 34_532.0,
        }
    }

    /// Relative arrival popularity. Scales the Poisson mean of the arrival
    /// process together with the configured task rate.
    pub fn popularity(self) -> f64 {
        match self {
            ApplicationKind::SpeechRecognition => 0.25,
            ApplicationKind::Nlp => 0.20,
            ApplicationKind::FaceRecognition => 0.15,
            ApplicationKind::SearchRequest => 0.10,
            ApplicationKind::LanguageTranslation => 0.10,
            ApplicationKind::Proc3dGame => 0.08,
            ApplicationKind::Vr => 0.07,
            ApplicationKind::Ar => 0.05,
        }
    }

    /// Bits carried per Poisson arrival unit.
    pub fn arrival_bits(self) -> f64 {
        match self {
            ApplicationKind::SpeechRecognition => 40.0 * KB,
            ApplicationKind::Nlp => 4.0 * KB,
            ApplicationKind::FaceRecognition => 10.0 * KB,
            ApplicationKind::SearchRequest => 2.0 * KB,
            ApplicationKind::LanguageTranslation => 2.0 * KB,
            ApplicationKind::Proc3dGame => 200.0 * KB,
            ApplicationKind::Vr => 100.0 * KB,
            ApplicationKind::Ar => 50.0 * KB,
        }
    }
}

impl std::fmt::Display for ApplicationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ApplicationKind::SpeechRecognition => "speech_recognition",
            ApplicationKind::Nlp => "nlp",
            ApplicationKind::FaceRecognition => "face_recognition",
            ApplicationKind::SearchRequest => "search_request",
            ApplicationKind::LanguageTranslation => "language_translation",
            ApplicationKind::Proc3dGame => "proc_3d_game",
            ApplicationKind::Vr => "vr",
            ApplicationKind::Ar => "ar",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Channel catalog
// ============================================================================

/// Link technology between an edge device and its higher tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Lte,
    Wifi,
    Bt,
    Nfc,
    Wired,
}

impl ChannelKind {
    /// Nominal uplink rate in bits per tick.
    pub fn uplink_rate(self) -> f64 {
        match self {
            ChannelKind::Lte => 75.0 * MBPS,
            ChannelKind::Wifi => 135.0 * MBPS,
            ChannelKind::Bt => 22.0 * MBPS,
            ChannelKind::Nfc => 212.0 * KBPS,
            ChannelKind::Wired => 1.0 * GBPS,
        }
    }

    /// Nominal downlink rate in bits per tick.
    pub fn downlink_rate(self) -> f64 {
        match self {
            ChannelKind::Lte => 300.0 * MBPS,
            ChannelKind::Wifi => 135.0 * MBPS,
            ChannelKind::Bt => 22.0 * MBPS,
            ChannelKind::Nfc => 212.0 * KBPS,
            ChannelKind::Wired => 1.0 * GBPS,
        }
    }

    /// Fractional rate jitter; each sample is drawn uniformly within
    /// `nominal * (1 ± jitter)`. Wired links are deterministic.
    pub fn jitter(self) -> f64 {
        match self {
            ChannelKind::Lte => 0.2,
            ChannelKind::Wifi => 0.3,
            ChannelKind::Bt => 0.1,
            ChannelKind::Nfc => 0.05,
            ChannelKind::Wired => 0.0,
        }
    }
}

// ============================================================================
// Simulation configuration
// ============================================================================

/// Full static configuration for one simulated topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Mean task generation rate (Poisson units per tick, before popularity
    /// weighting).
    pub task_rate: f64,
    /// Applications served by every edge device.
    pub applications: Vec<ApplicationKind>,
    /// Channel technology of the edge-to-cloud link.
    pub channel: ChannelKind,
    /// Number of edge processor cores.
    pub num_edge_cores: u32,
    /// Per-core edge clock in GHz.
    pub edge_core_ghz: f64,
    /// Number of cloud processor cores.
    pub num_cloud_cores: u32,
    /// Per-core cloud clock in GHz.
    pub cloud_core_ghz: f64,
    /// Capacity of each per-application edge queue, in bits.
    pub edge_queue_capacity: f64,
    /// Capacity of the aggregate cloud queue, in bits.
    pub cloud_queue_capacity: f64,
    /// Weight of the computation/payment term in the scalar cost.
    pub cost_weight: f64,
    /// Episode length in ticks; `step` reports `done` exactly when the tick
    /// counter reaches this value.
    pub max_episode_steps: u64,
    /// Lookback window, in ticks, for the mean-arrival-rate estimate.
    pub arrival_window: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            task_rate: 10.0,
            applications: vec![
                ApplicationKind::SpeechRecognition,
                ApplicationKind::Nlp,
                ApplicationKind::FaceRecognition,
            ],
            channel: ChannelKind::Wired,
            num_edge_cores: 10,
            edge_core_ghz: 4.0,
            num_cloud_cores: 54,
            cloud_core_ghz: 4.0,
            edge_queue_capacity: 1.0 * GB,
            cloud_queue_capacity: 10.0 * GB,
            cost_weight: 1e-3,
            max_episode_steps: 5000,
            arrival_window: 100,
        }
    }
}

impl SimConfig {
    /// Loads and validates a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the caller contract on all numeric fields.
    pub fn validate(&self) -> Result<()> {
        if self.applications.is_empty() {
            return Err(Error::Config("application set is empty".into()));
        }
        let mut seen = [false; APP_SLOTS];
        for app in &self.applications {
            if std::mem::replace(&mut seen[app.slot()], true) {
                return Err(Error::Config(format!("duplicate application: {app}")));
            }
        }
        if self.task_rate < 0.0 || !self.task_rate.is_finite() {
            return Err(Error::Config(format!(
                "task_rate must be finite and non-negative, got {}",
                self.task_rate
            )));
        }
        if self.num_edge_cores == 0 || self.num_cloud_cores == 0 {
            return Err(Error::Config("core counts must be positive".into()));
        }
        if self.edge_core_ghz <= 0.0 || self.cloud_core_ghz <= 0.0 {
            return Err(Error::Config("core clocks must be positive".into()));
        }
        if self.edge_queue_capacity <= 0.0 || self.cloud_queue_capacity <= 0.0 {
            return Err(Error::Config("queue capacities must be positive".into()));
        }
        if self.max_episode_steps == 0 {
            return Err(Error::Config("max_episode_steps must be positive".into()));
        }
        if self.arrival_window == 0 {
            return Err(Error::Config("arrival_window must be positive".into()));
        }
        Ok(())
    }

    /// Edge computational capability in bits per tick.
    pub fn edge_capability(&self) -> f64 {
        f64::from(self.num_edge_cores) * self.edge_core_ghz * GHZ
    }

    /// Cloud computational capability in bits per tick.
    pub fn cloud_capability(&self) -> f64 {
        f64::from(self.num_cloud_cores) * self.cloud_core_ghz * GHZ
    }
}

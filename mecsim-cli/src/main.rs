//! mecsim episode runner
//!
//! Drives the mobile-edge-computing environment for one or more episodes
//! under a simple action policy and reports per-episode returns. Intended
//! for smoke-testing configurations and producing reproducible traces; the
//! actual learning loop lives outside this repository.
//!
//! # Usage
//!
//! ```bash
//! mec-sim --episodes 3 --seed 42
//! mec-sim -c config/sim.yaml --policy idle
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use mecsim_core::{init_logging, Environment, LogLevel, SimConfig};

/// mecsim - two-tier edge/cloud queueing simulator
#[derive(Parser, Debug)]
#[command(name = "mec-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a simulation configuration file (YAML); defaults apply if
    /// omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// RNG seed for the environment
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of episodes to run
    #[arg(short = 'e', long, default_value_t = 1)]
    episodes: u32,

    /// Override the configured episode length in ticks
    #[arg(long, value_name = "TICKS")]
    steps: Option<u64>,

    /// Action policy for the run
    #[arg(long, value_enum, default_value_t = Policy::Random)]
    policy: Policy,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Built-in action policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Independent standard-uniform logits each tick
    Random,
    /// All-zero logits: uniform allocation after normalization
    Idle,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let level = LogLevel::from_str(&args.log_level)
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid --log-level")?;
    init_logging(level);

    let mut config = match &args.config_file {
        Some(path) => SimConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.max_episode_steps = steps;
    }
    info!(
        applications = config.applications.len(),
        channel = ?config.channel,
        task_rate = config.task_rate,
        episode_length = config.max_episode_steps,
        "configuration loaded"
    );

    let mut env = Environment::new(config, args.seed).context("failed to build topology")?;
    let mut policy_rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    let action_dim = env.action_dim();

    let mut returns = Vec::with_capacity(args.episodes as usize);
    for episode in 0..args.episodes {
        env.reset().context("reset failed")?;
        let mut episode_return = 0.0;
        loop {
            let action = match args.policy {
                Policy::Random => (0..action_dim)
                    .map(|_| policy_rng.gen_range(0.0..1.0))
                    .collect::<Vec<f64>>(),
                Policy::Idle => vec![0.0; action_dim],
            };
            let outcome = env.step(&action).context("step failed")?;
            episode_return += outcome.reward;
            if outcome.done {
                break;
            }
        }
        let diagnostics = env.diagnostics();
        info!(
            episode,
            episode_return,
            failed_to_generate = diagnostics.failed_to_generate,
            failed_to_offload = diagnostics.failed_to_offload,
            "episode finished"
        );
        returns.push(episode_return);
    }

    let mean = returns.iter().sum::<f64>() / returns.len().max(1) as f64;
    println!("episodes: {}", returns.len());
    println!("mean return: {mean:.6}");
    if let (Some(best), Some(worst)) = (
        returns.iter().cloned().reduce(f64::max),
        returns.iter().cloned().reduce(f64::min),
    ) {
        println!("best return: {best:.6}");
        println!("worst return: {worst:.6}");
    }
    Ok(())
}

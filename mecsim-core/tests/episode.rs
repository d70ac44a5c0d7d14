//! Whole-episode scenarios for the environment step interface.

use mecsim_core::{ApplicationKind, ChannelKind, Environment, SimConfig, GB, GHZ};

fn config(task_rate: f64, steps: u64) -> SimConfig {
    SimConfig {
        task_rate,
        max_episode_steps: steps,
        ..SimConfig::default()
    }
}

#[test]
fn quiet_episode_terminates_exactly_at_configured_length() {
    let steps = 25;
    let mut env = Environment::new(config(0.0, steps), 0).unwrap();
    let action = vec![0.0; env.action_dim()];

    let obs = env.reset().unwrap();
    assert_eq!(obs.len(), env.obs_dim());

    for tick in 1..=steps {
        let outcome = env.step(&action).unwrap();
        // No arrivals and no usage: reward identically 0 on every tick.
        assert_eq!(outcome.reward, 0.0, "tick {tick}");
        assert_eq!(outcome.done, tick == steps, "tick {tick}");
    }
    assert_eq!(env.tick(), steps);
}

#[test]
fn busy_episode_keeps_queue_invariants() {
    let mut env = Environment::new(config(10.0, 200), 11).unwrap();
    // Favor local compute on the first app, offload on the second.
    let action = [2.0, 0.5, 0.5, -1.0, 0.1, 2.0, 0.1, -1.0];
    let capacity = env.config().edge_queue_capacity;

    env.reset().unwrap();
    loop {
        let outcome = env.step(&action).unwrap();
        assert!(outcome.reward.is_finite());
        assert!(outcome.reward <= 0.0);
        for q in env.edge_queue_lengths(1.0) {
            assert!(q >= 0.0);
            assert!(q <= capacity);
        }
        for q in env.cloud_queue_lengths(1.0) {
            assert!(q >= 0.0);
            assert!(q <= env.config().cloud_queue_capacity);
        }
        if outcome.done {
            break;
        }
    }
    assert_eq!(env.tick(), 200);
}

#[test]
fn offload_moves_backlog_to_the_cloud() {
    let mut config = config(10.0, 50);
    // A starved edge processor forces backlog that only offload can drain.
    config.num_edge_cores = 1;
    config.edge_core_ghz = 1e-9;
    config.channel = ChannelKind::Wired;
    let mut env = Environment::new(config, 3).unwrap();

    // All offload bandwidth to the served applications, none idle.
    let action = [0.0, 0.0, 0.0, 0.0, 5.0, 5.0, 5.0, -5.0];
    for _ in 0..50 {
        env.step(&action).unwrap();
    }
    let cloud_served_something = env.cloud_queue_lengths(1.0)[0] > 0.0
        || env
            .observation()
            .unwrap()
            .iter()
            .any(|&v| v > 0.0 && v < 1.0);
    assert!(cloud_served_something);
    // The edge backlog stayed bounded by its queue capacity throughout.
    for q in env.edge_queue_lengths(1.0) {
        assert!(q <= env.config().edge_queue_capacity);
    }
}

#[test]
fn identical_seeds_reproduce_identical_episodes() {
    let mut a = Environment::new(config(10.0, 30), 99).unwrap();
    let mut b = Environment::new(config(10.0, 30), 99).unwrap();
    let action = [0.4, 0.1, -0.2, 0.3, 1.0, 0.0, 0.0, 0.0];

    let mut rewards_a = Vec::new();
    let mut rewards_b = Vec::new();
    for _ in 0..30 {
        rewards_a.push(a.step(&action).unwrap().reward);
        rewards_b.push(b.step(&action).unwrap().reward);
    }
    assert_eq!(rewards_a, rewards_b);
    assert_eq!(a.diagnostics(), b.diagnostics());
}

#[test]
fn reset_starts_a_fresh_episode() {
    let mut env = Environment::new(config(10.0, 40), 5).unwrap();
    let action = vec![0.2; env.action_dim()];
    for _ in 0..12 {
        env.step(&action).unwrap();
    }
    assert!(env.tick() > 0);

    env.reset().unwrap();
    assert_eq!(env.tick(), 0);
    assert!(env.edge_queue_lengths(1.0).iter().all(|&q| q == 0.0));

    // A full episode after reset still terminates on schedule.
    let mut done_at = None;
    for tick in 1..=40 {
        if env.step(&action).unwrap().done {
            done_at = Some(tick);
            break;
        }
    }
    assert_eq!(done_at, Some(40));
}

#[test]
fn custom_application_set_changes_action_dim() {
    let config = SimConfig {
        applications: vec![ApplicationKind::Vr, ApplicationKind::Ar],
        edge_queue_capacity: 1.0 * GB,
        ..SimConfig::default()
    };
    let env = Environment::new(config, 0).unwrap();
    assert_eq!(env.action_dim(), 6);
}

#[test]
fn backlog_scale_is_ghz_in_observations() {
    // A known backlog shows up in the queue-length block divided by GHZ.
    let mut env = Environment::new(config(10.0, 100), 5).unwrap();
    let idle = vec![0.0; env.action_dim()];
    env.step(&idle).unwrap();
    let lengths = env.edge_queue_lengths(GHZ);
    let raw = env.edge_queue_lengths(1.0);
    for (scaled, bits) in lengths.iter().zip(&raw) {
        assert!((scaled * GHZ - bits).abs() < 1e-6);
    }
}

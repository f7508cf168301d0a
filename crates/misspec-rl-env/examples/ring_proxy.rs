//! Example: controller trained on a proxy reward, scored on the true one

use std::sync::Arc;

use misspec_rl_core::{ContinuousAction, Environment, TrackedEnvironment};
use misspec_rl_env::{
    ring_rewards, EnvRegistry, ExperimentConfig, FlowParams, RingRoadBuilder, PROXY_REWARD_KEY,
    TRUE_REWARD_KEY,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut params = FlowParams::new("ring_proxy", "toy", "RingNetwork");
    params.env.horizon = 300;
    params.veh.add("human", "IDMController", 21);
    params.veh.add("rl", "RLController", 1);
    params.sim.seed = Some(7);

    // The proxy ignores comfort and rewards raw speed; the true reward also
    // penalises tailgating.
    let experiment = ExperimentConfig::from_json_str(
        r#"{
            "reward_specification": {
                "true": [["desired_vel", 1.0], ["headway", 0.5], ["accel", 0.1]],
                "proxy": [["commute", 1.0], ["action_noise", 0.2]]
            },
            "reward_fun": "proxy",
            "reward_scale": 0.1
        }"#,
    )?;

    let registry = EnvRegistry::global();
    let rewards = Arc::new(ring_rewards()?);
    let (factory, id) = registry.create(params, RingRoadBuilder, rewards, experiment)?;
    println!("Registered {id}");

    let mut env = TrackedEnvironment::new(factory()?);

    let num_episodes = 3;
    for episode in 0..num_episodes {
        env.reset().await?;
        let mut true_return = 0.0;
        let mut proxy_return = 0.0;

        loop {
            // Always floor it: good for the proxy, bad for the true reward
            let step = env.step(ContinuousAction(vec![1.0])).await?;
            true_return += step.info.get_f64(TRUE_REWARD_KEY).unwrap_or_default();
            proxy_return += step.info.get_f64(PROXY_REWARD_KEY).unwrap_or_default();

            if step.done || step.truncated {
                break;
            }
        }

        let stats = env.episode.as_ref();
        println!(
            "Episode {}: steps = {}, learning reward = {:.3}, true = {:.3}, proxy = {:.3}",
            episode + 1,
            stats.map_or(0, |e| e.steps),
            stats.map_or(0.0, |e| e.total_reward),
            true_return,
            proxy_return
        );
    }

    env.close().await?;

    Ok(())
}

//! Toy single-lane ring road for demos and tests
//!
//! One controllable vehicle (index 0) shares a ring with followers that
//! relax towards a gap-limited target speed. This is a stand-in for a real
//! traffic simulator, just enough to exercise reward composition.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use misspec_rl_core::{
    ActionSpace, BoxObservationSpace, ContinuousAction, ContinuousSpace, Environment,
    ObservationSpace, RLError, Result, Reward, Step, StepInfo, VectorObservation, CRASH_KEY,
};

use crate::params::{EnvBuilder, EnvInputs};
use crate::reward_registry::RewardRegistry;

const VEHICLE_LENGTH: f64 = 5.0;
const FOLLOWER_GAIN: f64 = 0.5;
const SAFE_TIME_HEADWAY: f64 = 1.5;
/// Speeds below this mark a corrupted simulator read-out
const SENTINEL_SPEED: f64 = -100.0;

/// Ring road configuration
#[derive(Debug, Clone)]
pub struct RingRoadConfig {
    /// Ring circumference in metres
    pub length: f64,
    /// Vehicles on the ring, including the controlled one
    pub num_vehicles: usize,
    /// Desired speed in m/s
    pub target_velocity: f64,
    /// Maximum acceleration
    pub max_accel: f64,
    /// Maximum deceleration (positive)
    pub max_decel: f64,
    /// Seconds per step
    pub sim_step: f64,
    /// Steps per episode
    pub horizon: usize,
    /// Seed for initial perturbations
    pub seed: Option<u64>,
}

impl Default for RingRoadConfig {
    fn default() -> Self {
        Self {
            length: 230.0,
            num_vehicles: 22,
            target_velocity: 10.0,
            max_accel: 1.0,
            max_decel: 1.0,
            sim_step: 0.1,
            horizon: 500,
            seed: None,
        }
    }
}

/// Ring road environment
pub struct RingRoadEnv {
    config: RingRoadConfig,
    positions: Vec<f64>,
    speeds: Vec<f64>,
    steps: usize,
    rng: StdRng,
}

impl RingRoadEnv {
    /// Create a ring with vehicles evenly spaced and at rest
    #[allow(clippy::cast_precision_loss)]
    pub fn new(config: RingRoadConfig) -> Result<Self> {
        if config.num_vehicles < 2 {
            return Err(RLError::Environment("ring road needs at least two vehicles".into()));
        }
        if !(config.target_velocity.is_finite() && config.target_velocity > 0.0) {
            return Err(RLError::Environment(format!(
                "target velocity must be positive, got {}",
                config.target_velocity
            )));
        }
        if config.length <= config.num_vehicles as f64 * VEHICLE_LENGTH {
            return Err(RLError::Environment(format!(
                "ring of length {} cannot hold {} vehicles",
                config.length, config.num_vehicles
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut env = Self {
            positions: Vec::new(),
            speeds: Vec::new(),
            steps: 0,
            rng,
            config,
        };
        env.place_vehicles(0.0);
        Ok(env)
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &RingRoadConfig {
        &self.config
    }

    /// Current speeds, controlled vehicle first
    #[must_use]
    pub fn speeds(&self) -> &[f64] {
        &self.speeds
    }

    /// Bumper-to-bumper gap in front of vehicle `i`
    #[must_use]
    pub fn headway(&self, i: usize) -> f64 {
        let leader = (i + 1) % self.positions.len();
        (self.positions[leader] - self.positions[i]).rem_euclid(self.config.length) - VEHICLE_LENGTH
    }

    /// Smallest gap on the ring
    #[must_use]
    pub fn min_headway(&self) -> f64 {
        (0..self.positions.len())
            .map(|i| self.headway(i))
            .fold(f64::INFINITY, f64::min)
    }

    /// Mean speed over all vehicles
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_speed(&self) -> f64 {
        self.speeds.iter().sum::<f64>() / self.speeds.len() as f64
    }

    /// Whether any two vehicles overlap
    #[must_use]
    pub fn crashed(&self) -> bool {
        self.min_headway() <= 0.0
    }

    /// Overwrite a speed; used to inject corrupted read-outs
    pub fn set_speed(&mut self, i: usize, speed: f64) {
        self.speeds[i] = speed;
    }

    /// Score in `[0, 1]`: 1 when every vehicle drives at the target speed
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn desired_velocity_score(&self) -> f64 {
        let target = self.config.target_velocity;
        let max_cost = (target * target * self.speeds.len() as f64).sqrt();
        let cost = self
            .speeds
            .iter()
            .map(|v| (v - target).powi(2))
            .sum::<f64>()
            .sqrt();
        ((max_cost - cost).max(0.0)) / max_cost
    }

    #[allow(clippy::cast_precision_loss)]
    fn place_vehicles(&mut self, perturbation: f64) {
        let n = self.config.num_vehicles;
        let spacing = self.config.length / n as f64;
        self.positions = (0..n)
            .map(|i| {
                let jitter = if perturbation > 0.0 {
                    self.rng.gen_range(-perturbation..perturbation)
                } else {
                    0.0
                };
                (i as f64 * spacing + jitter).rem_euclid(self.config.length)
            })
            .collect();
        self.speeds = vec![0.0; n];
    }

    fn clip_accel(&self, accel: f64) -> f64 {
        accel.clamp(-self.config.max_decel, self.config.max_accel)
    }

    /// Gap-limited relaxation towards the target speed
    fn follower_accel(&self, i: usize) -> f64 {
        let desired = self
            .config
            .target_velocity
            .min(self.headway(i).max(0.0) / SAFE_TIME_HEADWAY);
        self.clip_accel(FOLLOWER_GAIN * (desired - self.speeds[i]))
    }

    fn observation(&self) -> VectorObservation {
        let target = self.config.target_velocity;
        VectorObservation {
            data: vec![
                self.speeds[0] / target,
                self.speeds[1 % self.speeds.len()] / target,
                self.headway(0) / self.config.length,
            ],
        }
    }
}

#[async_trait]
impl Environment for RingRoadEnv {
    type Observation = VectorObservation;
    type Action = ContinuousAction;

    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>> {
        Box::new(BoxObservationSpace {
            low: vec![0.0, 0.0, -1.0],
            high: vec![5.0, 5.0, 1.0],
            shape: vec![3],
        })
    }

    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>> {
        Box::new(ContinuousSpace {
            low: vec![-self.config.max_decel],
            high: vec![self.config.max_accel],
        })
    }

    async fn reset(&mut self) -> Result<(Self::Observation, StepInfo)> {
        self.place_vehicles(1.0);
        self.steps = 0;
        Ok((self.observation(), StepInfo::default()))
    }

    async fn step(&mut self, action: Self::Action) -> Result<Step<Self::Observation>> {
        let requested = action
            .0
            .first()
            .copied()
            .ok_or_else(|| RLError::InvalidAction("ring road expects one acceleration".into()))?;

        let dt = self.config.sim_step;
        let mut accels = Vec::with_capacity(self.speeds.len());
        accels.push(self.clip_accel(requested));
        accels.extend((1..self.speeds.len()).map(|i| self.follower_accel(i)));

        for (i, accel) in accels.iter().enumerate() {
            self.speeds[i] = (self.speeds[i] + accel * dt).max(0.0);
            self.positions[i] =
                (self.positions[i] + self.speeds[i] * dt).rem_euclid(self.config.length);
        }
        self.steps += 1;

        let crash = self.crashed();
        let out_of_time = self.steps >= self.config.horizon;

        Ok(Step {
            observation: self.observation(),
            reward: self.compute_reward(&action, crash),
            done: crash || out_of_time,
            truncated: out_of_time && !crash,
            info: StepInfo::new()
                .with(CRASH_KEY, crash)
                .with("min_headway", self.min_headway()),
        })
    }

    fn compute_reward(&self, _action: &Self::Action, fail: bool) -> Reward {
        if fail {
            return Reward(0.0);
        }
        Reward(self.desired_velocity_score())
    }

    fn fallback_action(&self) -> Option<Self::Action> {
        Some(ContinuousAction(vec![self.follower_accel(0)]))
    }

    fn simulator_failed(&self) -> bool {
        self.speeds.iter().any(|v| *v < SENTINEL_SPEED)
    }
}

/// Closeness of all speeds to the target speed
pub fn desired_vel(env: &RingRoadEnv, _action: &ContinuousAction) -> f64 {
    env.desired_velocity_score()
}

/// Negative mean absolute commanded acceleration
#[allow(clippy::cast_precision_loss)]
pub fn accel(_env: &RingRoadEnv, action: &ContinuousAction) -> f64 {
    if action.0.is_empty() {
        return 0.0;
    }
    -action.0.iter().map(|a| a.abs()).sum::<f64>() / action.0.len() as f64
}

/// Penalty in `[-1, 0]` for following closer than the safe time headway
pub fn headway(env: &RingRoadEnv, _action: &ContinuousAction) -> f64 {
    let desired = (env.speeds()[0] * SAFE_TIME_HEADWAY).max(VEHICLE_LENGTH);
    (env.headway(0) / desired).min(1.0) - 1.0
}

/// Mean speed relative to the target speed
pub fn commute(env: &RingRoadEnv, _action: &ContinuousAction) -> f64 {
    env.mean_speed() / env.config().target_velocity
}

/// Reward registry with the ring road's named reward functions
pub fn ring_rewards() -> Result<RewardRegistry<RingRoadEnv>> {
    RewardRegistry::<RingRoadEnv>::new()
        .with("desired_vel", desired_vel)?
        .with("accel", accel)?
        .with("headway", headway)?
        .with("commute", commute)
}

/// Builds [`RingRoadEnv`] from experiment parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct RingRoadBuilder;

impl EnvBuilder for RingRoadBuilder {
    type Env = RingRoadEnv;

    fn env_name(&self) -> &str {
        "RingRoadEnv"
    }

    fn build(&self, inputs: EnvInputs) -> Result<RingRoadEnv> {
        let defaults = RingRoadConfig::default();
        let num_vehicles = match inputs.network.vehicles.num_vehicles() {
            0 => defaults.num_vehicles,
            n => n,
        };

        RingRoadEnv::new(RingRoadConfig {
            length: inputs.network.net_params.get_f64("length").unwrap_or(defaults.length),
            num_vehicles,
            target_velocity: inputs
                .env_params
                .get_f64("target_velocity")
                .unwrap_or(defaults.target_velocity),
            max_accel: inputs.env_params.get_f64("max_accel").unwrap_or(defaults.max_accel),
            max_decel: inputs.env_params.get_f64("max_decel").unwrap_or(defaults.max_decel),
            sim_step: inputs.sim_params.sim_step,
            horizon: inputs.env_params.horizon,
            seed: inputs.sim_params.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ring() -> RingRoadEnv {
        RingRoadEnv::new(RingRoadConfig {
            num_vehicles: 5,
            seed: Some(5),
            ..RingRoadConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_overfull_ring() {
        let config = RingRoadConfig {
            length: 50.0,
            num_vehicles: 22,
            ..RingRoadConfig::default()
        };
        assert!(RingRoadEnv::new(config).is_err());
    }

    #[test]
    fn test_rejects_non_positive_target_velocity() {
        for target_velocity in [0.0, -3.0, f64::NAN] {
            let config = RingRoadConfig {
                target_velocity,
                ..RingRoadConfig::default()
            };
            assert!(matches!(RingRoadEnv::new(config), Err(RLError::Environment(_))));
        }

        let mut inputs_params = crate::FlowParams::new("ring_zero", "toy", "RingNetwork");
        inputs_params
            .env
            .additional_params
            .insert("target_velocity".into(), serde_json::json!(0.0));
        let inputs = EnvInputs {
            env_params: inputs_params.env.clone(),
            sim_params: inputs_params.sim.clone(),
            network: crate::Network::from_params(&inputs_params, inputs_params.veh.clone()),
            simulator: inputs_params.simulator.clone(),
        };
        assert!(RingRoadBuilder.build(inputs).is_err());
    }

    #[tokio::test]
    async fn test_ring_accelerates_towards_target() {
        let mut env = ring();
        env.reset().await.unwrap();
        let before = env.desired_velocity_score();

        for _ in 0..50 {
            let step = env.step(ContinuousAction(vec![1.0])).await.unwrap();
            assert!(!step.info.crash());
        }

        assert!(env.desired_velocity_score() > before);
        assert!(env.mean_speed() > 0.0);
    }

    #[tokio::test]
    async fn test_native_reward_zero_on_failure() {
        let mut env = ring();
        env.reset().await.unwrap();
        env.step(ContinuousAction(vec![1.0])).await.unwrap();

        assert_eq!(env.compute_reward(&ContinuousAction(vec![0.0]), true).value(), 0.0);
        assert!(env.compute_reward(&ContinuousAction(vec![0.0]), false).value() >= 0.0);
    }

    #[test]
    fn test_reward_terms() {
        let env = ring();
        assert_relative_eq!(accel(&env, &ContinuousAction(vec![0.5, -1.5])), -1.0);
        assert_relative_eq!(desired_vel(&env, &ContinuousAction(vec![0.0])), 0.0);
        assert_relative_eq!(commute(&env, &ContinuousAction(vec![0.0])), 0.0);
        assert!(headway(&env, &ContinuousAction(vec![0.0])) <= 0.0);
    }

    #[test]
    fn test_sentinel_speed_marks_failure() {
        let mut env = ring();
        assert!(!env.simulator_failed());
        env.set_speed(3, -1001.0);
        assert!(env.simulator_failed());
    }

    #[tokio::test]
    async fn test_builder_through_registry() {
        let mut params = crate::FlowParams::new("ring_builder", "toy", "RingNetwork");
        params.veh.add("human", "IDMController", 4);
        params.veh.add("rl", "RLController", 1);
        params.env.horizon = 3;
        params.env.additional_params.insert("target_velocity".into(), serde_json::json!(8.0));
        params.sim.seed = Some(1);

        let experiment = crate::ExperimentConfig::from_json_str(
            r#"{"reward_specification": {"proxy": [["commute", 2.0]]}, "reward_fun": "proxy"}"#,
        )
        .unwrap();
        let registry = std::sync::Arc::new(crate::EnvRegistry::new());
        let (factory, id) = registry
            .create(
                params,
                RingRoadBuilder,
                std::sync::Arc::new(ring_rewards().unwrap()),
                experiment,
            )
            .unwrap();
        let suffix = id.strip_prefix("RingRoadEnv-v0").unwrap();
        assert!(suffix.parse::<u32>().unwrap() < 1 << 31);

        let mut env = factory().unwrap();
        assert_eq!(env.config().num_vehicles, 5);
        assert_eq!(env.config().target_velocity, 8.0);

        env.reset().await.unwrap();
        let mut steps = 0;
        loop {
            let step = env.step(ContinuousAction(vec![1.0])).await.unwrap();
            steps += 1;
            let commute = step.info.get_f64(crate::PROXY_REWARD_KEY).unwrap();
            assert_relative_eq!(step.reward.value(), commute);
            assert_relative_eq!(commute, 2.0 * env.mean_speed() / 8.0);
            if step.done {
                assert!(step.truncated);
                break;
            }
        }
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_registry_names() {
        let registry = ring_rewards().unwrap();
        assert_eq!(registry.names(), vec!["accel", "commute", "desired_vel", "headway"]);
    }
}

//! Proxy-reward wrapper reporting true and proxy rewards side by side

use std::ops::Deref;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use misspec_rl_core::{
    Action, ActionSpace, Environment, Episode, ObservationSpace, RLError, Result, Reward, Step,
    StepInfo,
};

use crate::channel::RewardChannel;
use crate::config::ProxyRewardConfig;
use crate::noise::{ActionNoise, ObservationNoise};
use crate::reward_registry::RewardRegistry;
use crate::specification::{
    RewardChannelKind, RewardSpecification, PROXY_REWARD_KEY, TRUE_REWARD_KEY,
};
use crate::strategy::{strategy_for, RewardStrategy};

/// Diagnostics key for the agent's action when the safe policy overrode it
pub const RL_ACTION_KEY: &str = "rl_action";

/// One strategy per channel
struct ChannelStrategies<E: Environment> {
    true_strategy: Box<dyn RewardStrategy<E>>,
    proxy_strategy: Box<dyn RewardStrategy<E>>,
}

impl<E: Environment> ChannelStrategies<E> {
    fn get(&self, kind: RewardChannelKind) -> &dyn RewardStrategy<E> {
        match kind {
            RewardChannelKind::True => self.true_strategy.as_ref(),
            RewardChannelKind::Proxy => self.proxy_strategy.as_ref(),
        }
    }
}

/// Wrapper that replaces the learning reward with a configurable channel
///
/// Every step reports both channels under `true_reward` / `proxy_reward` in
/// the step info; the returned reward is the active channel times
/// `reward_scale`. Without a [`RewardSpecification`] the wrapper passes the
/// native reward through and reports it in both keys.
///
/// The wrapped environment stays reachable through `Deref`, [`Self::env`]
/// and [`Self::into_inner`].
pub struct ProxyRewardWrapper<E: Environment> {
    env: E,
    channels: Option<ChannelStrategies<E>>,
    active: RewardChannelKind,
    reward_scale: f64,
    use_safe_policy_actions: bool,
    observation_noise: Option<ObservationNoise>,
    rng: StdRng,
}

impl<E: Environment + 'static> ProxyRewardWrapper<E> {
    /// Wrap `env`, resolving `specification` against `rewards`.
    ///
    /// The specification is consumed; channels left `None` use the native
    /// reward. Resolution errors surface here, before any step runs.
    pub fn new(
        env: E,
        specification: Option<RewardSpecification>,
        rewards: &RewardRegistry<E>,
        config: &ProxyRewardConfig,
    ) -> Result<Self> {
        config.validate()?;

        let channels = match specification {
            Some(spec) => {
                let resolve = |kind: RewardChannelKind| {
                    spec.channel(kind)
                        .map(|terms| RewardChannel::resolve(terms, rewards))
                        .transpose()
                };
                let true_resolved = resolve(RewardChannelKind::True)?;
                let proxy_resolved = resolve(RewardChannelKind::Proxy)?;

                let channels = ChannelStrategies {
                    true_strategy: strategy_for(RewardChannelKind::True, true_resolved),
                    proxy_strategy: strategy_for(RewardChannelKind::Proxy, proxy_resolved),
                };
                info!(
                    active = %config.reward_fun,
                    true_channel = channels.true_strategy.label(),
                    proxy_channel = channels.proxy_strategy.label(),
                    reward_scale = config.reward_scale,
                    "wrapping environment with proxy reward"
                );
                Some(channels)
            }
            None => {
                info!(
                    reward_scale = config.reward_scale,
                    "wrapping environment as reward passthrough"
                );
                None
            }
        };

        let observation_noise = if channels.is_some() {
            ObservationNoise::new(config.observation_noise)
        } else {
            if config.observation_noise > 0.0 {
                warn!(
                    "observation noise ignored: no reward specification, wrapper is a passthrough"
                );
            }
            None
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            env,
            channels,
            active: config.reward_fun,
            reward_scale: config.reward_scale,
            use_safe_policy_actions: config.use_safe_policy_actions,
            observation_noise,
            rng,
        })
    }

    /// Passthrough wrapper: native reward in both diagnostics keys
    pub fn passthrough(env: E, config: &ProxyRewardConfig) -> Result<Self> {
        Self::new(env, None, &RewardRegistry::new(), config)
    }
}

impl<E: Environment> ProxyRewardWrapper<E> {
    /// Channel returned as the learning reward
    #[must_use]
    pub fn active_channel(&self) -> RewardChannelKind {
        self.active
    }

    /// Multiplier applied to the returned reward
    #[must_use]
    pub fn reward_scale(&self) -> f64 {
        self.reward_scale
    }

    /// Whether no reward specification was given
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.channels.is_none()
    }

    /// Action noise currently in effect (the active channel's)
    #[must_use]
    pub fn action_noise(&self) -> Option<ActionNoise> {
        self.channels
            .as_ref()
            .and_then(|channels| channels.get(self.active).action_noise())
            .filter(ActionNoise::is_active)
    }

    /// Wrapped environment
    #[must_use]
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Mutable access to the wrapped environment
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Unwrap, returning the original environment
    pub fn into_inner(self) -> E {
        self.env
    }

    fn perturb_observation(&mut self, observation: E::Observation) -> Result<E::Observation> {
        match self.observation_noise {
            Some(noise) => noise.apply(&observation, &mut self.rng),
            None => Ok(observation),
        }
    }

    /// Failure flag for composed channels
    fn failed(&self, info: &StepInfo) -> bool {
        info.crash() || self.env.simulator_failed()
    }
}

impl<E: Environment> Deref for ProxyRewardWrapper<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.env
    }
}

#[async_trait]
impl<E> Environment for ProxyRewardWrapper<E>
where
    E: Environment,
{
    type Observation = E::Observation;
    type Action = E::Action;

    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>> {
        self.env.observation_space()
    }

    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>> {
        self.env.action_space()
    }

    async fn reset(&mut self) -> Result<(Self::Observation, StepInfo)> {
        let (observation, info) = self.env.reset().await?;
        Ok((self.perturb_observation(observation)?, info))
    }

    async fn step(&mut self, action: Self::Action) -> Result<Step<Self::Observation>> {
        let perturbed = match self.action_noise() {
            Some(noise) => noise.apply(&action, &mut self.rng)?,
            None => action.clone(),
        };

        // `rl_action` keeps what the agent chose, before any noise
        let (applied, overridden) = if self.use_safe_policy_actions {
            let fallback = self.env.fallback_action().ok_or_else(|| {
                RLError::Environment(
                    "safe policy actions requested but the environment has no fallback controller"
                        .into(),
                )
            })?;
            debug!(
                agent = ?action.to_vec(),
                fallback = ?fallback.to_vec(),
                "safe policy override"
            );
            (fallback, Some(action))
        } else {
            (perturbed, None)
        };

        let mut step = self.env.step(applied.clone()).await?;

        if let Some(agent_action) = overridden {
            step.info.insert(RL_ACTION_KEY, agent_action.to_vec());
        }

        let (true_value, proxy_value) = match &self.channels {
            None => (step.reward.value(), step.reward.value()),
            Some(channels) => {
                let fail = self.failed(&step.info);
                (
                    channels.true_strategy.evaluate(&self.env, &applied, fail),
                    channels.proxy_strategy.evaluate(&self.env, &applied, fail),
                )
            }
        };

        step.info.insert(TRUE_REWARD_KEY, true_value);
        step.info.insert(PROXY_REWARD_KEY, proxy_value);

        let active_value = match self.active {
            RewardChannelKind::True => true_value,
            RewardChannelKind::Proxy => proxy_value,
        };
        step.reward = Reward(active_value) * self.reward_scale;
        step.observation = self.perturb_observation(step.observation)?;

        trace!(true_value, proxy_value, reward = step.reward.value(), "proxy reward step");
        Ok(step)
    }

    /// The active channel's value for the current state
    fn compute_reward(&self, action: &Self::Action, fail: bool) -> Reward {
        match &self.channels {
            None => self.env.compute_reward(action, fail),
            Some(channels) => {
                let fail = fail || self.env.simulator_failed();
                Reward(channels.get(self.active).evaluate(&self.env, action, fail))
            }
        }
    }

    fn fallback_action(&self) -> Option<Self::Action> {
        self.env.fallback_action()
    }

    fn simulator_failed(&self) -> bool {
        self.env.simulator_failed()
    }

    async fn render(&self) -> Result<()> {
        self.env.render().await
    }

    async fn close(&mut self) -> Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<Episode> {
        self.env.episode_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scripted_rewards, ScriptedEnv};
    use approx::assert_relative_eq;
    use misspec_rl_core::ContinuousAction;

    fn config(active: RewardChannelKind, scale: f64) -> ProxyRewardConfig {
        ProxyRewardConfig {
            reward_fun: active,
            reward_scale: scale,
            seed: Some(42),
            ..ProxyRewardConfig::default()
        }
    }

    fn wrap(
        env: ScriptedEnv,
        spec: RewardSpecification,
        cfg: &ProxyRewardConfig,
    ) -> ProxyRewardWrapper<ScriptedEnv> {
        ProxyRewardWrapper::new(env, Some(spec), &scripted_rewards(), cfg).unwrap()
    }

    fn act(x: f64) -> ContinuousAction {
        ContinuousAction(vec![x])
    }

    #[tokio::test]
    async fn test_scaled_proxy_reward_with_unscaled_diagnostics() {
        let spec = RewardSpecification::new()
            .with_true([("a", 1.0), ("b", -2.0)])
            .with_proxy([("a", 0.5)]);
        let env = ScriptedEnv::new(3.0, 1.0);
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::Proxy, 2.0));

        wrapper.reset().await.unwrap();
        let step = wrapper.step(act(0.0)).await.unwrap();

        assert_relative_eq!(step.info.get_f64(PROXY_REWARD_KEY).unwrap(), 1.5);
        assert_relative_eq!(step.reward.value(), 3.0);
        assert_relative_eq!(step.info.get_f64(TRUE_REWARD_KEY).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_passthrough_reports_native_reward_in_both_keys() {
        let env = ScriptedEnv::new(3.0, 1.0);
        let mut wrapper =
            ProxyRewardWrapper::passthrough(env, &config(RewardChannelKind::Proxy, 1.0)).unwrap();
        assert!(wrapper.is_passthrough());

        for native in [0.0, -1.25, 7.5] {
            wrapper.env_mut().native = native;
            wrapper.env_mut().crash = native < 0.0;
            let step = wrapper.step(act(0.1)).await.unwrap();

            assert_eq!(step.info.get_f64(TRUE_REWARD_KEY), Some(native));
            assert_eq!(step.info.get_f64(PROXY_REWARD_KEY), Some(native));
            assert_eq!(step.reward.value(), native);
        }
    }

    #[tokio::test]
    async fn test_passthrough_still_scales() {
        let env = ScriptedEnv::new(0.0, 0.0).with_native(1.5);
        let mut wrapper =
            ProxyRewardWrapper::passthrough(env, &config(RewardChannelKind::True, 2.0)).unwrap();

        let step = wrapper.step(act(0.0)).await.unwrap();
        assert_eq!(step.reward.value(), 3.0);
        assert_eq!(step.info.get_f64(TRUE_REWARD_KEY), Some(1.5));
    }

    #[tokio::test]
    async fn test_crash_zeroes_composed_channels() {
        let spec = RewardSpecification::new()
            .with_true([("a", 1.0)])
            .with_proxy([("b", 4.0)]);
        let mut env = ScriptedEnv::new(3.0, 1.0).with_native(9.0);
        env.crash = true;
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::Proxy, 1.0));

        let step = wrapper.step(act(0.0)).await.unwrap();
        assert_eq!(step.info.get_f64(TRUE_REWARD_KEY), Some(0.0));
        assert_eq!(step.info.get_f64(PROXY_REWARD_KEY), Some(0.0));
        assert_eq!(step.reward.value(), 0.0);
        assert!(step.info.crash());
    }

    #[tokio::test]
    async fn test_simulator_failure_zeroes_composed_channels() {
        let spec = RewardSpecification::new().with_true([("a", 1.0)]).with_proxy([("b", 1.0)]);
        let mut env = ScriptedEnv::new(3.0, 1.0);
        env.sentinel_failure = true;
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::True, 1.0));

        let step = wrapper.step(act(0.0)).await.unwrap();
        assert_eq!(step.info.get_f64(TRUE_REWARD_KEY), Some(0.0));
        assert_eq!(step.info.get_f64(PROXY_REWARD_KEY), Some(0.0));
    }

    #[tokio::test]
    async fn test_unspecified_channel_uses_native_reward() {
        let spec = RewardSpecification::new().with_proxy([("a", 2.0)]);
        let env = ScriptedEnv::new(1.25, 0.0).with_native(-4.0);
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::True, 1.0));

        let step = wrapper.step(act(0.0)).await.unwrap();
        assert_eq!(step.reward.value(), -4.0);
        assert_eq!(step.info.get_f64(TRUE_REWARD_KEY), Some(-4.0));
        assert_eq!(step.info.get_f64(PROXY_REWARD_KEY), Some(2.5));
    }

    #[tokio::test]
    async fn test_discretised_action_reaches_simulator() {
        let spec = RewardSpecification::new()
            .with_true([("first_action", 1.0)])
            .with_proxy([("first_action", 1.0), ("disc_action_noise", 0.1)]);
        let env = ScriptedEnv::new(0.0, 0.0);
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::Proxy, 1.0));
        assert_eq!(wrapper.action_noise(), Some(ActionNoise::Discretize { step: 0.1 }));

        let step = wrapper.step(act(0.34)).await.unwrap();
        assert_relative_eq!(wrapper.applied[0].0[0], 0.3, epsilon = 1e-12);
        assert_relative_eq!(step.reward.value(), 0.3, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn test_noise_only_follows_active_channel() {
        let spec = RewardSpecification::new()
            .with_true([("a", 1.0)])
            .with_proxy([("a", 1.0), ("action_noise", 5.0)]);
        let env = ScriptedEnv::new(0.0, 0.0);
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::True, 1.0));

        assert!(wrapper.action_noise().is_none());
        wrapper.step(act(0.34)).await.unwrap();
        assert_eq!(wrapper.applied[0], act(0.34));
    }

    #[tokio::test]
    async fn test_zero_sigma_leaves_action_untouched() {
        let spec = RewardSpecification::new().with_proxy([("a", 1.0), ("action_noise", 0.0)]);
        let env = ScriptedEnv::new(0.0, 0.0);
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::Proxy, 1.0));

        wrapper.step(act(0.34)).await.unwrap();
        assert_eq!(wrapper.applied[0], act(0.34));
    }

    #[tokio::test]
    async fn test_safe_policy_override_records_agent_action() {
        let mut env = ScriptedEnv::new(0.0, 0.0);
        env.fallback = Some(act(-0.5));
        let cfg = ProxyRewardConfig {
            use_safe_policy_actions: true,
            ..config(RewardChannelKind::True, 1.0)
        };
        let spec = RewardSpecification::new().with_true([("first_action", 1.0)]);
        let mut wrapper = wrap(env, spec, &cfg);

        let step = wrapper.step(act(0.8)).await.unwrap();
        assert_eq!(wrapper.applied[0], act(-0.5));
        assert_eq!(step.info.fields[RL_ACTION_KEY], serde_json::json!([0.8]));
        assert_eq!(step.reward.value(), -0.5);
    }

    #[tokio::test]
    async fn test_safe_policy_records_action_before_noise() {
        let mut env = ScriptedEnv::new(0.0, 0.0);
        env.fallback = Some(act(-0.5));
        let cfg = ProxyRewardConfig {
            use_safe_policy_actions: true,
            ..config(RewardChannelKind::Proxy, 1.0)
        };
        let spec = RewardSpecification::new()
            .with_proxy([("first_action", 1.0), ("disc_action_noise", 0.1)]);
        let mut wrapper = wrap(env, spec, &cfg);

        let step = wrapper.step(act(0.34)).await.unwrap();
        assert_eq!(step.info.fields[RL_ACTION_KEY], serde_json::json!([0.34]));
        assert_eq!(wrapper.applied[0], act(-0.5));
        assert_eq!(step.reward.value(), -0.5);
    }

    #[tokio::test]
    async fn test_safe_policy_without_fallback_is_an_error() {
        let cfg = ProxyRewardConfig {
            use_safe_policy_actions: true,
            ..config(RewardChannelKind::True, 1.0)
        };
        let mut wrapper =
            ProxyRewardWrapper::passthrough(ScriptedEnv::new(0.0, 0.0), &cfg).unwrap();

        assert!(matches!(wrapper.step(act(0.0)).await.unwrap_err(), RLError::Environment(_)));
    }

    #[tokio::test]
    async fn test_done_and_truncated_pass_through() {
        let mut env = ScriptedEnv::new(0.0, 0.0);
        env.done_after = 2;
        let spec = RewardSpecification::new().with_proxy([("a", 1.0)]);
        let mut wrapper = wrap(env, spec, &config(RewardChannelKind::Proxy, 1.0));

        let first = wrapper.step(act(0.0)).await.unwrap();
        let second = wrapper.step(act(0.0)).await.unwrap();
        assert!(!first.done && !first.truncated);
        assert!(second.done && !second.truncated);
    }

    #[tokio::test]
    async fn test_unwrap_round_trip_delegates() {
        let env = ScriptedEnv::new(2.0, 5.0).with_native(1.0);
        let mut wrapper =
            ProxyRewardWrapper::passthrough(env, &ProxyRewardConfig::default()).unwrap();

        let (observation, _) = wrapper.reset().await.unwrap();
        assert_eq!(observation.data, vec![2.0, 5.0]);
        assert_eq!(wrapper.a, 2.0);
        assert_eq!(wrapper.env().resets, 1);

        let mut inner = wrapper.into_inner();
        assert_eq!(inner.resets, 1);
        inner.reset().await.unwrap();
        assert_eq!(inner.resets, 2);
    }

    #[tokio::test]
    async fn test_compute_reward_uses_active_channel() {
        let spec = RewardSpecification::new().with_proxy([("a", 3.0)]);
        let env = ScriptedEnv::new(2.0, 0.0).with_native(1.0);
        let wrapper = wrap(env, spec, &config(RewardChannelKind::Proxy, 1.0));

        assert_eq!(Environment::compute_reward(&wrapper, &act(0.0), false).value(), 6.0);
        assert_eq!(Environment::compute_reward(&wrapper, &act(0.0), true).value(), 0.0);
        assert_eq!(Environment::compute_reward(wrapper.env(), &act(0.0), false).value(), 1.0);
    }

    #[test]
    fn test_unknown_reward_fails_at_wrap_time() {
        let spec = RewardSpecification::new().with_proxy([("missing", 1.0)]);
        let result = ProxyRewardWrapper::new(
            ScriptedEnv::new(0.0, 0.0),
            Some(spec),
            &scripted_rewards(),
            &ProxyRewardConfig::default(),
        );
        assert!(matches!(result.err().unwrap(), RLError::UnknownReward { .. }));
    }

    #[tokio::test]
    async fn test_observation_noise_applies_to_reset_and_step() {
        let spec = RewardSpecification::new().with_proxy([("a", 1.0)]);
        let cfg = ProxyRewardConfig {
            observation_noise: 0.5,
            ..config(RewardChannelKind::Proxy, 1.0)
        };
        let mut wrapper = wrap(ScriptedEnv::new(1.0, 1.0), spec, &cfg);

        let (observation, _) = wrapper.reset().await.unwrap();
        assert_ne!(observation.data, vec![1.0, 1.0]);
        let step = wrapper.step(act(0.0)).await.unwrap();
        assert_ne!(step.observation.data, vec![1.0, 1.0]);
        assert_eq!(step.info.get_f64(PROXY_REWARD_KEY), Some(1.0));
    }
}

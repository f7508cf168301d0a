//! Reward strategies: how one channel turns a finished step into a value

use misspec_rl_core::Environment;

use crate::channel::{ResolvedChannel, RewardChannel};
use crate::noise::ActionNoise;
use crate::specification::RewardChannelKind;

/// Computes one channel's value from the environment after a step
///
/// Selected once, when the wrapper is built. Evaluation is pure with
/// respect to the environment and the applied action.
pub trait RewardStrategy<E: Environment>: Send + Sync {
    /// Channel this strategy fills
    fn kind(&self) -> RewardChannelKind;

    /// Short label used in logs
    fn label(&self) -> &'static str;

    /// Action noise requested by this channel's specification
    fn action_noise(&self) -> Option<ActionNoise> {
        None
    }

    /// Channel value; `fail` is the step's terminal-failure flag
    fn evaluate(&self, env: &E, action: &E::Action, fail: bool) -> f64;
}

/// Defers to the environment's own [`Environment::compute_reward`]
#[derive(Debug, Clone, Copy)]
pub struct NativeStrategy {
    kind: RewardChannelKind,
}

impl NativeStrategy {
    /// Native strategy standing in for `kind`
    #[must_use]
    pub fn new(kind: RewardChannelKind) -> Self {
        Self { kind }
    }
}

impl<E: Environment> RewardStrategy<E> for NativeStrategy {
    fn kind(&self) -> RewardChannelKind {
        self.kind
    }

    fn label(&self) -> &'static str {
        "native"
    }

    fn evaluate(&self, env: &E, action: &E::Action, fail: bool) -> f64 {
        env.compute_reward(action, fail).value()
    }
}

/// Composed strategy for the true channel
#[derive(Debug)]
pub struct TrueChannelStrategy<E: Environment> {
    channel: RewardChannel<E>,
    noise: Option<ActionNoise>,
}

impl<E: Environment> TrueChannelStrategy<E> {
    /// Wrap a resolved true channel
    #[must_use]
    pub fn new(resolved: ResolvedChannel<E>) -> Self {
        Self {
            channel: resolved.channel,
            noise: resolved.noise,
        }
    }
}

impl<E: Environment> RewardStrategy<E> for TrueChannelStrategy<E> {
    fn kind(&self) -> RewardChannelKind {
        RewardChannelKind::True
    }

    fn label(&self) -> &'static str {
        "composed"
    }

    fn action_noise(&self) -> Option<ActionNoise> {
        self.noise
    }

    fn evaluate(&self, env: &E, action: &E::Action, fail: bool) -> f64 {
        self.channel.evaluate(env, action, fail)
    }
}

/// Composed strategy for the proxy channel
#[derive(Debug)]
pub struct ProxyChannelStrategy<E: Environment> {
    channel: RewardChannel<E>,
    noise: Option<ActionNoise>,
}

impl<E: Environment> ProxyChannelStrategy<E> {
    /// Wrap a resolved proxy channel
    #[must_use]
    pub fn new(resolved: ResolvedChannel<E>) -> Self {
        Self {
            channel: resolved.channel,
            noise: resolved.noise,
        }
    }
}

impl<E: Environment> RewardStrategy<E> for ProxyChannelStrategy<E> {
    fn kind(&self) -> RewardChannelKind {
        RewardChannelKind::Proxy
    }

    fn label(&self) -> &'static str {
        "composed"
    }

    fn action_noise(&self) -> Option<ActionNoise> {
        self.noise
    }

    fn evaluate(&self, env: &E, action: &E::Action, fail: bool) -> f64 {
        self.channel.evaluate(env, action, fail)
    }
}

/// Pick the strategy for `kind`: composed if terms were given, native otherwise
pub fn strategy_for<E: Environment + 'static>(
    kind: RewardChannelKind,
    resolved: Option<ResolvedChannel<E>>,
) -> Box<dyn RewardStrategy<E>> {
    match (kind, resolved) {
        (RewardChannelKind::True, Some(resolved)) => Box::new(TrueChannelStrategy::new(resolved)),
        (RewardChannelKind::Proxy, Some(resolved)) => Box::new(ProxyChannelStrategy::new(resolved)),
        (kind, None) => Box::new(NativeStrategy::new(kind)),
    }
}

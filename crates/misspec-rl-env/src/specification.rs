//! User-facing reward specification and channel selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use misspec_rl_core::{Environment, RLError, Result};

use crate::channel::RewardChannel;
use crate::reward_registry::RewardRegistry;

/// Pseudo-term selecting Gaussian action noise; its weight is the standard deviation
pub const ACTION_NOISE_TERM: &str = "action_noise";

/// Pseudo-term selecting action discretisation; its weight is the grid step
pub const DISC_ACTION_NOISE_TERM: &str = "disc_action_noise";

/// Diagnostics key for the true channel's value
pub const TRUE_REWARD_KEY: &str = "true_reward";

/// Diagnostics key for the proxy channel's value
pub const PROXY_REWARD_KEY: &str = "proxy_reward";

/// Which reward channel a value belongs to, or which one the agent sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardChannelKind {
    /// Ground-truth objective
    #[default]
    True,
    /// Signal delivered to the learner; `observed` is accepted as an alias
    #[serde(alias = "observed")]
    Proxy,
}

impl RewardChannelKind {
    /// Key under which this channel's value is reported in step diagnostics
    #[must_use]
    pub fn diagnostics_key(self) -> &'static str {
        match self {
            Self::True => TRUE_REWARD_KEY,
            Self::Proxy => PROXY_REWARD_KEY,
        }
    }
}

impl fmt::Display for RewardChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("true"),
            Self::Proxy => f.write_str("proxy"),
        }
    }
}

impl FromStr for RewardChannelKind {
    type Err = RLError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "true" => Ok(Self::True),
            "proxy" | "observed" => Ok(Self::Proxy),
            other => Err(RLError::Environment(format!(
                "unknown reward channel '{other}', expected 'true', 'proxy' or 'observed'"
            ))),
        }
    }
}

/// Weighted `(name, weight)` pairs making up one channel
pub type ChannelTerms = Vec<(String, f64)>;

/// Which named reward functions feed the true and proxy channels
///
/// A channel left as `None` falls back to the wrapped environment's native
/// reward. In JSON:
///
/// ```json
/// {"true": null, "proxy": [["desired_vel", 1.0], ["accel", -0.1]]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardSpecification {
    /// Terms of the true channel
    #[serde(rename = "true", default)]
    pub true_terms: Option<ChannelTerms>,
    /// Terms of the proxy channel
    #[serde(alias = "observed", default)]
    pub proxy: Option<ChannelTerms>,
}

impl RewardSpecification {
    /// Specification with both channels on the native reward
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the true channel's terms
    #[must_use]
    pub fn with_true<S: Into<String>>(mut self, terms: impl IntoIterator<Item = (S, f64)>) -> Self {
        self.true_terms = Some(terms.into_iter().map(|(n, w)| (n.into(), w)).collect());
        self
    }

    /// Set the proxy channel's terms
    #[must_use]
    pub fn with_proxy<S: Into<String>>(
        mut self,
        terms: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        self.proxy = Some(terms.into_iter().map(|(n, w)| (n.into(), w)).collect());
        self
    }

    /// Terms configured for `kind`, if any
    #[must_use]
    pub fn channel(&self, kind: RewardChannelKind) -> Option<&[(String, f64)]> {
        match kind {
            RewardChannelKind::True => self.true_terms.as_deref(),
            RewardChannelKind::Proxy => self.proxy.as_deref(),
        }
    }

    /// Resolve both channels against `registry` and discard the result.
    ///
    /// Surfaces unknown names and bad weights before any environment is built.
    pub fn validate<E: Environment>(&self, registry: &RewardRegistry<E>) -> Result<()> {
        for kind in [RewardChannelKind::True, RewardChannelKind::Proxy] {
            if let Some(terms) = self.channel(kind) {
                RewardChannel::resolve(terms, registry)?;
            }
        }
        Ok(())
    }
}

//! Configuration for proxy-reward wrappers and environment creation

use std::path::Path;

use serde::{Deserialize, Serialize};

use misspec_rl_core::{RLError, Result};

use crate::specification::{RewardChannelKind, RewardSpecification};

/// Settings of a single [`ProxyRewardWrapper`](crate::ProxyRewardWrapper)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyRewardConfig {
    /// Channel whose value is returned as the learning reward
    pub reward_fun: RewardChannelKind,
    /// Multiplier on the returned reward (diagnostics stay unscaled)
    pub reward_scale: f64,
    /// Apply the environment's fallback controller instead of the agent
    pub use_safe_policy_actions: bool,
    /// Standard deviation of Gaussian noise on returned observations
    pub observation_noise: f64,
    /// Seed for the wrapper's noise generator
    pub seed: Option<u64>,
}

impl Default for ProxyRewardConfig {
    fn default() -> Self {
        Self {
            reward_fun: RewardChannelKind::True,
            reward_scale: 1.0,
            use_safe_policy_actions: false,
            observation_noise: 0.0,
            seed: None,
        }
    }
}

impl ProxyRewardConfig {
    /// Reject non-finite scale and negative or non-finite noise
    pub fn validate(&self) -> Result<()> {
        if !self.reward_scale.is_finite() {
            return Err(RLError::invalid_weight(
                "reward_scale",
                format!("{} is not finite", self.reward_scale),
            ));
        }
        if !self.observation_noise.is_finite() || self.observation_noise < 0.0 {
            return Err(RLError::invalid_weight(
                "observation_noise",
                format!("{} is not a finite non-negative deviation", self.observation_noise),
            ));
        }
        Ok(())
    }
}

/// Everything an experiment decides about reward composition and registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// `None` wraps the environment as a pure passthrough
    pub reward_specification: Option<RewardSpecification>,
    /// Wrapper settings
    #[serde(flatten)]
    pub wrapper: ProxyRewardConfig,
    /// First version number probed when minting the environment id
    pub version: u32,
    /// `Some(true)` forces windowed rendering over the simulation parameters
    pub render: Option<bool>,
}

impl ExperimentConfig {
    /// Parse from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.wrapper.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

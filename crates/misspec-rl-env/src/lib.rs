//! Reward composition and environment registration for traffic RL experiments
//!
//! This crate provides:
//! - A named registry of reward functions
//! - True and proxy reward channels built from weighted terms
//! - A wrapper that swaps an environment's reward for a composed one
//! - A registry that mints collision-free environment identifiers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod config;
pub mod noise;
pub mod params;
pub mod registry;
pub mod reward_registry;
pub mod specification;
pub mod strategy;
pub mod toy;
pub mod wrappers;

#[cfg(test)]
mod testing;

pub use channel::{ResolvedChannel, RewardChannel, RewardTerm};
pub use config::{ExperimentConfig, ProxyRewardConfig};
pub use noise::{ActionNoise, ObservationNoise};
pub use params::{
    EnvBuilder, EnvInputs, EnvParams, FlowParams, InitialConfig, NetParams, Network, SimParams,
    TrafficLightParams, VehicleParams,
};
pub use registry::{env_constructor, EnvFactory, EnvRegistry, EnvSpec};
pub use reward_registry::RewardRegistry;
pub use specification::{
    ChannelTerms, RewardChannelKind, RewardSpecification, ACTION_NOISE_TERM, DISC_ACTION_NOISE_TERM,
    PROXY_REWARD_KEY, TRUE_REWARD_KEY,
};
pub use strategy::{NativeStrategy, ProxyChannelStrategy, RewardStrategy, TrueChannelStrategy};
pub use toy::{ring_rewards, RingRoadBuilder, RingRoadConfig, RingRoadEnv};
pub use wrappers::{ProxyRewardWrapper, RL_ACTION_KEY};

// Re-export core types
pub use misspec_rl_core::{
    Action, ActionSpace, Environment, Episode, Observation, ObservationSpace, RLError, Result,
    Reward, RewardFunction, Step, StepInfo, TrackedEnvironment,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        env_constructor, EnvRegistry, ExperimentConfig, FlowParams, ProxyRewardConfig,
        ProxyRewardWrapper, RewardChannelKind, RewardRegistry, RewardSpecification,
    };
    pub use misspec_rl_core::prelude::*;
}

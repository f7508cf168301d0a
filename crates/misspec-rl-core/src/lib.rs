//! Core reinforcement learning contracts for reward-misspecification studies
//!
//! This crate provides the environment, action, observation and reward
//! abstractions shared by wrappers that compose true and proxy rewards.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod environment;
pub mod error;
pub mod observation;
pub mod reward;

// Re-export core traits and types
pub use action::{Action, ActionSpace, ContinuousAction, ContinuousSpace};
pub use environment::{Environment, Episode, Step, StepInfo, TrackedEnvironment, CRASH_KEY};
pub use error::{RLError, Result};
pub use observation::{BoxObservationSpace, Observation, ObservationSpace, VectorObservation};
pub use reward::{Reward, RewardFunction};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Action, ActionSpace, Environment, Observation, ObservationSpace, Result, Reward,
        RewardFunction, Step, StepInfo,
    };
}

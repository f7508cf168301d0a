//! Reward signals and reward functions

use serde::{Deserialize, Serialize};

use crate::Environment;

/// Reward signal from the environment
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Reward(pub f64);

impl Reward {
    /// Create a new reward
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Get the reward value
    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Reward {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<Reward> for f64 {
    fn from(reward: Reward) -> Self {
        reward.0
    }
}

impl std::ops::Add for Reward {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl std::ops::Mul<f64> for Reward {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}

/// A named scalar reward term computed from the environment after a step
///
/// Implementations must be pure: they read the environment and the applied
/// action and never mutate either.
pub trait RewardFunction<E: Environment>: Send + Sync {
    /// Score the environment's current state under `action`
    fn evaluate(&self, env: &E, action: &E::Action) -> f64;
}

impl<E, F> RewardFunction<E> for F
where
    E: Environment,
    F: Fn(&E, &E::Action) -> f64 + Send + Sync,
{
    fn evaluate(&self, env: &E, action: &E::Action) -> f64 {
        self(env, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_arithmetic() {
        let total = Reward::new(1.5) + Reward::from(0.5);
        assert_eq!(total * 2.0, Reward(4.0));
        assert_eq!(f64::from(total), 2.0);
    }
}

//! Environment traits and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Action, ActionSpace, Observation, ObservationSpace, Reward};

/// Diagnostics key carrying the simulator's terminal-failure flag
pub const CRASH_KEY: &str = "crash";

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step<O> {
    /// Observation from the environment
    pub observation: O,
    /// Reward signal
    pub reward: Reward,
    /// Whether the episode is done
    pub done: bool,
    /// Whether the episode was truncated (e.g., time limit)
    pub truncated: bool,
    /// Additional info from the environment
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StepInfo {
    /// Create an empty info map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`StepInfo::insert`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Read a numeric field
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Read a boolean field
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Terminal-failure flag reported by the simulator; absent means no crash
    #[must_use]
    pub fn crash(&self) -> bool {
        self.get_bool(CRASH_KEY).unwrap_or(false)
    }
}

/// Episode information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Episode ID
    pub id: String,
    /// Total reward
    pub total_reward: f64,
    /// Number of steps
    pub steps: usize,
    /// Whether episode was truncated
    pub truncated: bool,
    /// Start time
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// End time
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Core environment trait
///
/// Besides the usual `reset`/`step` pair an environment exposes its native
/// reward computation through [`Environment::compute_reward`], so that a
/// wrapper can report it next to rewards composed from other terms.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Observation type
    type Observation: Observation;
    /// Action type
    type Action: Action;

    /// Get the observation space
    fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>>;

    /// Get the action space
    fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>>;

    /// Reset the environment
    async fn reset(&mut self) -> crate::Result<(Self::Observation, StepInfo)>;

    /// Take a step in the environment
    async fn step(&mut self, action: Self::Action) -> crate::Result<Step<Self::Observation>>;

    /// The environment's own reward for the current state under `action`.
    ///
    /// `fail` carries the step's terminal-failure flag. Must not mutate state.
    fn compute_reward(&self, action: &Self::Action, fail: bool) -> Reward;

    /// Action the environment's fallback controller would apply right now
    fn fallback_action(&self) -> Option<Self::Action> {
        None
    }

    /// Whether the simulator's read-out is invalid (e.g. sentinel speeds after a crash)
    fn simulator_failed(&self) -> bool {
        false
    }

    /// Render the environment (optional)
    async fn render(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Close the environment
    async fn close(&mut self) -> crate::Result<()> {
        Ok(())
    }

    /// Get current episode info
    fn episode_info(&self) -> Option<Episode> {
        None
    }
}

/// Wrapper for environments that tracks episodes
pub struct TrackedEnvironment<E> {
    /// Inner environment
    pub env: E,
    /// Current episode
    pub episode: Option<Episode>,
    /// Step counter
    pub step_count: usize,
}

impl<E> TrackedEnvironment<E> {
    /// Create a new tracked environment
    pub fn new(env: E) -> Self {
        Self {
            env,
            episode: None,
            step_count: 0,
        }
    }
}

#[async_trait]
impl<E> Environment for TrackedEnvironment<E>
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

    async fn reset(&mut self) -> crate::Result<(Self::Observation, StepInfo)> {
        // End current episode if exists
        if let Some(ref mut episode) = self.episode {
            episode.end_time = Some(chrono::Utc::now());
        }

        self.episode = Some(Episode {
            id: uuid::Uuid::new_v4().to_string(),
            total_reward: 0.0,
            steps: 0,
            truncated: false,
            start_time: chrono::Utc::now(),
            end_time: None,
        });
        self.step_count = 0;

        self.env.reset().await
    }

    async fn step(&mut self, action: Self::Action) -> crate::Result<Step<Self::Observation>> {
        let step = self.env.step(action).await?;

        self.step_count += 1;
        if let Some(ref mut episode) = self.episode {
            episode.total_reward += step.reward.0;
            episode.steps = self.step_count;

            if step.done || step.truncated {
                episode.truncated = step.truncated;
                episode.end_time = Some(chrono::Utc::now());
                debug!(
                    episode = %episode.id,
                    steps = episode.steps,
                    total_reward = episode.total_reward,
                    truncated = episode.truncated,
                    "episode finished"
                );
            }
        }

        Ok(step)
    }

    fn compute_reward(&self, action: &Self::Action, fail: bool) -> Reward {
        self.env.compute_reward(action, fail)
    }

    fn fallback_action(&self) -> Option<Self::Action> {
        self.env.fallback_action()
    }

    fn simulator_failed(&self) -> bool {
        self.env.simulator_failed()
    }

    async fn render(&self) -> crate::Result<()> {
        self.env.render().await
    }

    async fn close(&mut self) -> crate::Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<Episode> {
        self.episode.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContinuousAction, ContinuousSpace, BoxObservationSpace, VectorObservation};

    /// Counts steps; ends the episode after three
    struct Counter {
        t: usize,
    }

    #[async_trait]
    impl Environment for Counter {
        type Observation = VectorObservation;
        type Action = ContinuousAction;

        fn observation_space(&self) -> Box<dyn ObservationSpace<Observation = Self::Observation>> {
            Box::new(BoxObservationSpace::new(vec![0.0], vec![10.0], vec![1]).unwrap())
        }

        fn action_space(&self) -> Box<dyn ActionSpace<Action = Self::Action>> {
            Box::new(ContinuousSpace::new(vec![-1.0], vec![1.0]).unwrap())
        }

        async fn reset(&mut self) -> crate::Result<(Self::Observation, StepInfo)> {
            self.t = 0;
            Ok((VectorObservation { data: vec![0.0] }, StepInfo::default()))
        }

        #[allow(clippy::cast_precision_loss)]
        async fn step(&mut self, action: Self::Action) -> crate::Result<Step<Self::Observation>> {
            self.t += 1;
            Ok(Step {
                observation: VectorObservation { data: vec![self.t as f64] },
                reward: self.compute_reward(&action, false),
                done: self.t >= 3,
                truncated: false,
                info: StepInfo::new().with(CRASH_KEY, false),
            })
        }

        fn compute_reward(&self, action: &Self::Action, _fail: bool) -> Reward {
            Reward(action.0.iter().sum())
        }
    }

    #[test]
    fn test_step_info_accessors() {
        let info = StepInfo::new().with("crash", true).with("speed", 4.5);
        assert!(info.crash());
        assert_eq!(info.get_f64("speed"), Some(4.5));
        assert!(!StepInfo::default().crash());
    }

    #[tokio::test]
    async fn test_tracked_environment_accumulates_episode() {
        let mut env = TrackedEnvironment::new(Counter { t: 0 });
        env.reset().await.unwrap();

        for _ in 0..3 {
            env.step(ContinuousAction(vec![0.5])).await.unwrap();
        }

        let episode = env.episode_info().unwrap();
        assert_eq!(episode.steps, 3);
        approx::assert_relative_eq!(episode.total_reward, 1.5);
        assert!(episode.end_time.is_some());
        assert!(!episode.truncated);
    }
}

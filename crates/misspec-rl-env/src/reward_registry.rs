//! Named reward functions available to reward specifications

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use misspec_rl_core::{Environment, RLError, Result, RewardFunction};

use crate::noise::ActionNoise;

/// Mapping from reward name to a pure `(environment, action) -> f64` function
///
/// Filled during start-up through `&mut self`, then shared read-only
/// (typically as `Arc<RewardRegistry<E>>`) by every wrapper built from it.
pub struct RewardRegistry<E: Environment> {
    functions: HashMap<String, Arc<dyn RewardFunction<E>>>,
}

impl<E: Environment> RewardRegistry<E> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register a reward function under `name`
    ///
    /// Fails with [`RLError::DuplicateName`] if the name is taken, including
    /// the reserved noise pseudo-terms.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> Result<()>
    where
        F: RewardFunction<E> + 'static,
    {
        let name = name.into();
        if self.functions.contains_key(&name) || ActionNoise::is_reserved(&name) {
            return Err(RLError::DuplicateName { name });
        }

        debug!(reward = %name, "registered reward function");
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    /// Builder-style [`RewardRegistry::register`]
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Result<Self>
    where
        F: RewardFunction<E> + 'static,
    {
        self.register(name, function)?;
        Ok(self)
    }

    /// Look up a reward function by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn RewardFunction<E>>> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| RLError::UnknownReward { name: name.to_string() })
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered functions
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl<E: Environment> Default for RewardRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Environment> fmt::Debug for RewardRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewardRegistry")
            .field("names", &self.names())
            .finish()
    }
}

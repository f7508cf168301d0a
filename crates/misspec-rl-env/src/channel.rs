//! Weighted linear combinations of registered reward functions

use std::fmt;
use std::sync::Arc;

use misspec_rl_core::{Environment, RLError, Result, RewardFunction};

use crate::noise::ActionNoise;
use crate::reward_registry::RewardRegistry;

/// One resolved `(name, weight)` pair
pub struct RewardTerm<E: Environment> {
    name: String,
    weight: f64,
    function: Arc<dyn RewardFunction<E>>,
}

impl<E: Environment> RewardTerm<E> {
    /// Registered name of the function
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Weight applied to the function's value
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Weighted contribution of this term
    pub fn evaluate(&self, env: &E, action: &E::Action) -> f64 {
        self.weight * self.function.evaluate(env, action)
    }
}

impl<E: Environment> Clone for RewardTerm<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            weight: self.weight,
            function: Arc::clone(&self.function),
        }
    }
}

impl<E: Environment> fmt::Debug for RewardTerm<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewardTerm")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Ordered sequence of reward terms; order fixes summation order
pub struct RewardChannel<E: Environment> {
    terms: Vec<RewardTerm<E>>,
}

/// A channel together with the action noise its specification asked for
#[derive(Debug)]
pub struct ResolvedChannel<E: Environment> {
    /// Weighted terms
    pub channel: RewardChannel<E>,
    /// `action_noise` / `disc_action_noise` pseudo-term, if present
    pub noise: Option<ActionNoise>,
}

impl<E: Environment> RewardChannel<E> {
    /// Resolve `(name, weight)` pairs against `registry`.
    ///
    /// Weights must be finite. The noise pseudo-terms are split off into
    /// [`ResolvedChannel::noise`]: their weight must be non-negative, and at
    /// most one of them may appear, once. Stops at the first unknown name.
    pub fn resolve(
        pairs: &[(String, f64)],
        registry: &RewardRegistry<E>,
    ) -> Result<ResolvedChannel<E>> {
        let mut terms = Vec::with_capacity(pairs.len());
        let mut noise: Option<ActionNoise> = None;

        for (name, weight) in pairs {
            let weight = *weight;
            if !weight.is_finite() {
                return Err(RLError::invalid_weight(
                    name.as_str(),
                    format!("{weight} is not finite"),
                ));
            }

            if let Some(mode) = ActionNoise::from_term(name, weight) {
                if weight < 0.0 {
                    return Err(RLError::invalid_weight(
                        name.as_str(),
                        "noise weight must be non-negative",
                    ));
                }
                if let Some(existing) = noise {
                    return Err(RLError::invalid_weight(
                        name.as_str(),
                        format!("conflicts with earlier '{}' in the same channel", existing.term()),
                    ));
                }
                noise = Some(mode);
                continue;
            }

            terms.push(RewardTerm {
                name: name.clone(),
                weight,
                function: registry.resolve(name)?,
            });
        }

        Ok(ResolvedChannel {
            channel: Self { terms },
            noise,
        })
    }

    /// `Σ weight_i * fn_i(env, action)`, or `0.0` when `fail` is set
    pub fn evaluate(&self, env: &E, action: &E::Action, fail: bool) -> f64 {
        if fail {
            return 0.0;
        }
        self.terms.iter().map(|term| term.evaluate(env, action)).sum()
    }

    /// Terms in summation order
    #[must_use]
    pub fn terms(&self) -> &[RewardTerm<E>] {
        &self.terms
    }

    /// Number of terms
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the channel has no terms (it then always evaluates to zero)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl<E: Environment> Clone for RewardChannel<E> {
    fn clone(&self) -> Self {
        Self {
            terms: self.terms.clone(),
        }
    }
}

impl<E: Environment> fmt::Debug for RewardChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.terms).finish()
    }
}

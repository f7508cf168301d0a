//! Action and observation perturbation

use rand::Rng;
use rand_distr::{Distribution, Normal};

use misspec_rl_core::{Action, Observation, RLError, Result};

use crate::specification::{ACTION_NOISE_TERM, DISC_ACTION_NOISE_TERM};

/// Perturbation applied to the agent's action before it reaches the simulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionNoise {
    /// Independent zero-mean Gaussian noise per component
    Gaussian {
        /// Standard deviation
        std_dev: f64,
    },
    /// Round every component to the nearest multiple of `step`
    Discretize {
        /// Grid step
        step: f64,
    },
}

impl ActionNoise {
    /// Map a reserved pseudo-term to its noise mode
    #[must_use]
    pub fn from_term(name: &str, weight: f64) -> Option<Self> {
        match name {
            ACTION_NOISE_TERM => Some(Self::Gaussian { std_dev: weight }),
            DISC_ACTION_NOISE_TERM => Some(Self::Discretize { step: weight }),
            _ => None,
        }
    }

    /// Whether `name` is one of the reserved noise pseudo-terms
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        matches!(name, ACTION_NOISE_TERM | DISC_ACTION_NOISE_TERM)
    }

    /// Pseudo-term this mode was configured with
    #[must_use]
    pub fn term(&self) -> &'static str {
        match self {
            Self::Gaussian { .. } => ACTION_NOISE_TERM,
            Self::Discretize { .. } => DISC_ACTION_NOISE_TERM,
        }
    }

    /// A zero weight leaves actions untouched
    #[must_use]
    pub fn is_active(&self) -> bool {
        match self {
            Self::Gaussian { std_dev } => *std_dev > 0.0,
            Self::Discretize { step } => *step > 0.0,
        }
    }

    /// Return the perturbed copy of `action`
    pub fn apply<A: Action, R: Rng + ?Sized>(&self, action: &A, rng: &mut R) -> Result<A> {
        if !self.is_active() {
            return Ok(action.clone());
        }

        let values: Vec<f64> = match *self {
            Self::Discretize { step } => action
                .to_vec()
                .into_iter()
                .map(|x| discretize(x, step))
                .collect(),
            Self::Gaussian { std_dev } => {
                let normal = gaussian(ACTION_NOISE_TERM, std_dev)?;
                action.to_vec().into_iter().map(|x| x + normal.sample(rng)).collect()
            }
        };

        A::from_vec(&values)
    }
}

/// Nearest multiple of `step`
#[must_use]
pub fn discretize(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// Gaussian perturbation of returned observations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationNoise {
    /// Standard deviation
    pub std_dev: f64,
}

impl ObservationNoise {
    /// `None` when `std_dev` is zero
    #[must_use]
    pub fn new(std_dev: f64) -> Option<Self> {
        (std_dev > 0.0).then_some(Self { std_dev })
    }

    /// Return the perturbed copy of `observation`
    pub fn apply<O: Observation, R: Rng + ?Sized>(
        &self,
        observation: &O,
        rng: &mut R,
    ) -> Result<O> {
        let normal = gaussian("observation_noise", self.std_dev)?;
        let values = observation
            .to_vec()
            .into_iter()
            .map(|x| x + normal.sample(rng))
            .collect();
        observation.from_vec(values)
    }
}

fn gaussian(term: &str, std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std_dev).map_err(|e| RLError::invalid_weight(term, e.to_string()))
}

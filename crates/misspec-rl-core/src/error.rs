//! Error types for the RL core library

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// Environment-related errors
    #[error("Environment error: {0}")]
    Environment(String),

    /// A reward specification names a function the registry does not know
    #[error("Unknown reward function: {name}")]
    UnknownReward {
        /// Requested reward name
        name: String,
    },

    /// A reward function name was registered twice
    #[error("Reward function already registered: {name}")]
    DuplicateName {
        /// Offending reward name
        name: String,
    },

    /// Non-finite weight or conflicting noise terms in a reward channel
    #[error("Invalid weight for '{term}': {reason}")]
    InvalidWeight {
        /// Term (or noise pseudo-term) the weight belongs to
        term: String,
        /// What is wrong with it
        reason: String,
    },

    /// An environment identifier was registered twice
    #[error("Environment id already registered: {id}")]
    RegistrationConflict {
        /// Offending identifier
        id: String,
    },

    /// Invalid action
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RLError {
    /// Shorthand for an [`RLError::InvalidWeight`]
    pub fn invalid_weight(term: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidWeight {
            term: term.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;

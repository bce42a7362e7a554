//! Error types for the motion engine
//!
//! ## Table of Contents
//! - **MotionError**: Main error enum covering all failure modes
//! - **Rejection**: Why a pipeline run discarded its candidate state
//! - **Result**: Type alias for `Result<T, MotionError>`

use crate::types::{CharacterId, CollisionInfo};
use std::fmt;
use thiserror::Error;

/// Result type alias for motion operations
pub type Result<T> = std::result::Result<T, MotionError>;

/// Main error type for motion operations
#[derive(Error, Debug)]
pub enum MotionError {
    /// Malformed caller input (direction, speed, clip definition)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Requested animation clip is not in the repository
    #[error("unknown animation clip: {0}")]
    UnknownClip(String),

    /// A layer rejected the candidate state; the stored state is unchanged
    #[error("pipeline rejected: {0}")]
    Rejected(Rejection),

    /// Clip repository failure
    #[error("repository error: {0}")]
    Repository(String),

    /// Configuration error during builder setup
    #[error("configuration error: {0}")]
    Config(String),

    /// Runtime not started or already stopped
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Metrics registration or export failure
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse error
    #[error("config format error: {0}")]
    ConfigFormat(#[from] toml::de::Error),
}

impl MotionError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a repository error
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// True when a layer discarded the candidate (collision, validation or fault)
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The rejection details, if this is a pipeline rejection
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<prometheus::Error> for MotionError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

impl From<Rejection> for MotionError {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// A candidate state discarded by the layer fold
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Character whose update was discarded
    pub character_id: CharacterId,
    /// Name of the layer that rejected it
    pub layer: String,
    /// What went wrong
    pub cause: RejectionCause,
}

impl Rejection {
    /// Create a new rejection
    pub fn new(character_id: CharacterId, layer: impl Into<String>, cause: RejectionCause) -> Self {
        Self {
            character_id,
            layer: layer.into(),
            cause,
        }
    }

    /// True when the rejecting layer panicked or broke the state contract
    pub fn is_fault(&self) -> bool {
        matches!(self.cause, RejectionCause::Fault(_))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected by layer '{}': {}", self.character_id, self.layer, self.cause)
    }
}

/// Cause of a pipeline rejection
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionCause {
    /// The layer's collision check reported an obstruction
    Collision(CollisionInfo),
    /// The layer's plausibility check failed
    Validation,
    /// The layer panicked or produced a non-finite / negative-speed state
    Fault(String),
}

impl RejectionCause {
    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            RejectionCause::Collision(_) => "collision",
            RejectionCause::Validation => "validation",
            RejectionCause::Fault(_) => "fault",
        }
    }
}

impl fmt::Display for RejectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionCause::Collision(info) => write!(f, "collision at {}", info),
            RejectionCause::Validation => write!(f, "state failed validation"),
            RejectionCause::Fault(msg) => write!(f, "layer fault: {}", msg),
        }
    }
}

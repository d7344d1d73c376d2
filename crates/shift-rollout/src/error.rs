//! Rollout error types.

use std::time::Duration;

use thiserror::Error;

/// Errors rejected when a rollout is constructed.
///
/// Nothing in the running loop produces these: once a controller exists,
/// collaborator failures are absorbed (see [`AnalysisError`] and
/// [`ActionError`]).
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("step must be between 1 and 100, got {0}")]
    InvalidStep(u32),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("{0} must not exceed 365 days")]
    IntervalTooLong(&'static str),

    #[error("{0} cluster id must not be empty")]
    EmptyClusterId(&'static str),

    #[error("old and new cluster must differ, both are {0:?}")]
    SameCluster(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type RolloutResult<T> = Result<T, RolloutError>;

/// Malformed configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: String, value: String },

    #[error("invalid url for {field}: {value:?}")]
    InvalidUrl { field: String, value: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Failure to obtain a verdict from an analyzer.
///
/// Every variant is treated as "do not continue".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("no analysis target configured for cluster {0:?}")]
    UnknownCluster(String),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("analysis backend unreachable: {0}")]
    Transport(String),

    #[error("analysis backend returned status {0}")]
    Status(u16),

    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

impl AnalysisError {
    /// Short, stable label for logs and metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::UnknownCluster(_) => "unknown_cluster",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status(_) => "status",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Failure to apply a score at the action sink.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("action sink unreachable: {0}")]
    Transport(String),

    #[error("action sink timed out after {0:?}")]
    Timeout(Duration),

    #[error("action sink rejected update with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("score {0} is outside 0..=100")]
    InvalidScore(u32),

    #[error("{0}")]
    Other(String),
}

impl ActionError {
    /// Short, stable label used as the `cause` label of
    /// `score_update_failures_total`.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::InvalidScore(_) => "invalid_score",
            Self::Other(_) => "other",
        }
    }
}

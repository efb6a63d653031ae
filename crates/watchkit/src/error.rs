#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors raised while reading [`ObservationConfig`](crate::ObservationConfig)
/// from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid boolean for {var}: {value:?} (expected 1/0/true/false/yes/no/on/off)")]
    InvalidBool { var: &'static str, value: String },
}

impl ConfigError {
    /// Name of the environment variable that failed to parse.
    #[must_use]
    pub fn var(&self) -> &'static str {
        match self {
            Self::InvalidBool { var, .. } => var,
        }
    }
}

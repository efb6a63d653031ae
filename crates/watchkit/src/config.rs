#![forbid(unsafe_code)]

//! Registrar configuration.
//!
//! Environment variables:
//! - `WATCHKIT_TRACE_ACCESS` (bool): emit a `trace!` event for every property read.
//! - `WATCHKIT_TRACE_MUTATION` (bool): emit a `debug!` event for every mutation.
//! - `WATCHKIT_DIAGNOSTICS` (bool): deliver events to an installed diagnostic hook.
//!
//! Booleans accept `1/0/true/false/yes/no/on/off`, case-insensitive.

use std::env;

use crate::error::ConfigError;

pub const ENV_TRACE_ACCESS: &str = "WATCHKIT_TRACE_ACCESS";
pub const ENV_TRACE_MUTATION: &str = "WATCHKIT_TRACE_MUTATION";
pub const ENV_DIAGNOSTICS: &str = "WATCHKIT_DIAGNOSTICS";

/// Logging and diagnostics toggles for a [`Registrar`](crate::Registrar).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationConfig {
    /// Emit a `trace!` event on every `on_access`. Off by default: reads are hot.
    pub trace_access: bool,
    /// Emit a `debug!` event on every `on_mutate`.
    pub trace_mutation: bool,
    /// Forward events to the registrar's diagnostic hook, if one is installed.
    pub diagnostics: bool,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            trace_access: false,
            trace_mutation: true,
            diagnostics: true,
        }
    }
}

impl ObservationConfig {
    /// Config with every log and diagnostic channel disabled.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            trace_access: false,
            trace_mutation: false,
            diagnostics: false,
        }
    }

    #[must_use]
    pub const fn with_trace_access(mut self, enabled: bool) -> Self {
        self.trace_access = enabled;
        self
    }

    #[must_use]
    pub const fn with_trace_mutation(mut self, enabled: bool) -> Self {
        self.trace_mutation = enabled;
        self
    }

    #[must_use]
    pub const fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Parse config from environment variables, starting from the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Parse config from an arbitrary key lookup.
    ///
    /// Unset keys keep their default. The first unparsable value is reported.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = get(ENV_TRACE_ACCESS) {
            config.trace_access = parse_bool(ENV_TRACE_ACCESS, value)?;
        }
        if let Some(value) = get(ENV_TRACE_MUTATION) {
            config.trace_mutation = parse_bool(ENV_TRACE_MUTATION, value)?;
        }
        if let Some(value) = get(ENV_DIAGNOSTICS) {
            config.diagnostics = parse_bool(ENV_DIAGNOSTICS, value)?;
        }
        Ok(config)
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}

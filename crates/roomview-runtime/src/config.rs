//! Environment-backed runtime configuration for attached room views.

use std::{env, error::Error, fmt};

use roomview_core::{DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_PAGE_SIZE, WindowConfig};

const DEFAULT_COMMAND_BUFFER: usize = 64;
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Runtime configuration used when attaching a room view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// Window cap assigned when the view attaches.
    pub initial_window_size: usize,
    /// Fixed increment for local reveals and backfill fetch sizes.
    pub page_size: usize,
    /// Command channel buffer size.
    pub command_buffer: usize,
    /// Event broadcast buffer size.
    pub event_buffer: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ViewConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let initial_window_size = parse_optional_usize(
            "ROOMVIEW_INITIAL_WINDOW_SIZE",
            DEFAULT_INITIAL_WINDOW_SIZE,
            &mut lookup,
        )?;
        let page_size = parse_optional_usize("ROOMVIEW_PAGE_SIZE", DEFAULT_PAGE_SIZE, &mut lookup)?;
        let command_buffer = parse_optional_usize(
            "ROOMVIEW_COMMAND_BUFFER",
            DEFAULT_COMMAND_BUFFER,
            &mut lookup,
        )?;
        let event_buffer =
            parse_optional_usize("ROOMVIEW_EVENT_BUFFER", DEFAULT_EVENT_BUFFER, &mut lookup)?;

        if initial_window_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ROOMVIEW_INITIAL_WINDOW_SIZE",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ROOMVIEW_PAGE_SIZE",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            initial_window_size,
            page_size,
            command_buffer,
            event_buffer,
        })
    }

    /// Window sizing derived from this configuration.
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            initial_size: self.initial_window_size,
            page_size: self.page_size,
        }
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn parse_optional_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<usize>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

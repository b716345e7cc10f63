//! Runtime configuration.
//!
//! Defaults can be overridden from environment variables:
//! - `CRMSYNC_CHORD_WINDOW_MS`: max gap between the two keys of a chord (default: 1000)
//! - `CRMSYNC_AUTOSAVE_DELAY_MS`: auto-save quiet period (default: 1000)
//! - `CRMSYNC_HISTORY_LIMIT`: undo stack bound (default: 50)
//! - `CRMSYNC_DB_PATH`: SQLite file for persisted macros and preferences (default: "crmsync.db")

use std::time::Duration;

use crate::error::CoreError;

pub const DEFAULT_CHORD_WINDOW: Duration = Duration::from_millis(1000);
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_DB_PATH: &str = "crmsync.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub chord_window: Duration,
    pub autosave_delay: Duration,
    pub history_limit: usize,
    pub db_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            chord_window: DEFAULT_CHORD_WINDOW,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
            history_limit: DEFAULT_HISTORY_LIMIT,
            db_path: DEFAULT_DB_PATH.to_string(),
        }
    }
}

impl SyncConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SyncConfig::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "CRMSYNC_CHORD_WINDOW_MS")? {
            config.chord_window = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CRMSYNC_AUTOSAVE_DELAY_MS")? {
            config.autosave_delay = Duration::from_millis(ms);
        }
        if let Some(limit) = parse_var::<usize, _>(&lookup, "CRMSYNC_HISTORY_LIMIT")? {
            if limit == 0 {
                return Err(CoreError::InvalidConfig {
                    name: "CRMSYNC_HISTORY_LIMIT".to_string(),
                    value: "0".to_string(),
                });
            }
            config.history_limit = limit;
        }
        if let Some(path) = lookup("CRMSYNC_DB_PATH") {
            config.db_path = path;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, CoreError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| CoreError::InvalidConfig {
                name: name.to_string(),
                value: raw,
            }),
    }
}

//! Process settings read from the environment (after `.env` is loaded by the binary).

use crate::error::ConfigError;
use crate::session::DEFAULT_STORAGE_TIMEOUT;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct Settings {
    /// Postgres connection string; in-memory storage when absent.
    pub database_url: Option<String>,
    /// Postgres schema holding the tables; `public` when absent.
    pub database_schema: Option<String>,
    pub bind_addr: SocketAddr,
    pub storage_timeout: Duration,
    /// JSON schema document; the bundled blog schema when absent.
    pub schema_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: v,
            })?,
            None => DEFAULT_BIND_ADDR.parse().map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: DEFAULT_BIND_ADDR.into(),
            })?,
        };
        let storage_timeout = match get("STORAGE_TIMEOUT_MS") {
            Some(v) => match v.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "STORAGE_TIMEOUT_MS",
                        value: v,
                    })
                }
            },
            None => DEFAULT_STORAGE_TIMEOUT,
        };

        Ok(Settings {
            database_url: get("DATABASE_URL"),
            database_schema: get("DATABASE_SCHEMA"),
            bind_addr,
            storage_timeout,
            schema_path: get("SCHEMA_PATH").map(PathBuf::from),
        })
    }
}

use std::path::Path;

use crate::store::retry::RetryConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub auth_token: Option<String>,
    /// Top-level segment every community record hangs under.
    pub root: String,
    pub http_timeout_secs: u64,
    pub startup_retries: u32,
    pub startup_base_delay_ms: u64,
}

impl Config {
    /// Load the optional env file, then read every field from the environment.
    pub fn load() -> Self {
        let env_file = std::env::var("GUILDKEEP_ENV_FILE")
            .unwrap_or_else(|_| "etc/secrets/secrets.env".to_string());
        if Path::new(&env_file).exists() {
            // Variables already set in the process win over the file.
            let _ = dotenvy::from_path(&env_file);
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(d.database_url),
            auth_token: std::env::var("DATABASE_AUTH").ok().filter(|v| !v.is_empty()),
            root: std::env::var("STATE_ROOT").unwrap_or(d.root),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.http_timeout_secs),
            startup_retries: std::env::var("STARTUP_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.startup_retries),
            startup_base_delay_ms: std::env::var("STARTUP_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.startup_base_delay_ms),
        }
    }

    pub fn startup_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.startup_retries,
            base_delay_ms: self.startup_base_delay_ms,
            ..RetryConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            auth_token: None,
            root: "communities".to_string(),
            http_timeout_secs: 15,
            startup_retries: 5,
            startup_base_delay_ms: 250,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_retry_carries_overrides() {
        let cfg = Config {
            startup_retries: 2,
            startup_base_delay_ms: 10,
            ..Config::default()
        };
        let retry = cfg.startup_retry();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.base_delay_ms, 10);
    }
}

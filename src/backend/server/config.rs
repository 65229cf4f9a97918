/**
 * Server Configuration
 *
 * This module loads the progress server's configuration from environment
 * variables, with sensible defaults for local development.
 *
 * # Configuration Sources
 *
 * | Variable                  | Default                                      |
 * |---------------------------|----------------------------------------------|
 * | `SERVER_PORT`             | 3004                                         |
 * | `PROGRESS_DATA_DIR`       | `<local data dir>/pathsync/progress-data`    |
 * | `SAVE_STRATEGY`           | `update-per-owner`                           |
 * | `MAX_FILES_PER_OWNER`     | 5                                            |
 * | `SNAPSHOT_INTERVAL_SECS`  | 1800                                         |
 * | `POLL_INTERVAL_SECS`      | 5                                            |
 * | `HEARTBEAT_INTERVAL_SECS` | 30                                           |
 *
 * # Error Handling
 *
 * Configuration errors are logged but do not prevent server startup.
 * Unparseable values fall back to their defaults with a warning.
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::progress::SaveStrategy;

/// Runtime configuration for the progress server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP server listens on
    pub port: u16,
    /// Directory holding the stored progress files
    pub data_dir: PathBuf,
    /// How saves map onto files on disk
    pub strategy: SaveStrategy,
    /// Retention limit per `(owner, file type)` pair
    pub max_files_per_owner: usize,
    /// Minimum age before `timed-snapshots` starts a new file
    pub snapshot_interval: Duration,
    /// How often the polling fallback scans for file changes
    pub poll_interval: Duration,
    /// How often a quiet events connection receives a heartbeat
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3004,
            data_dir: default_data_dir(),
            strategy: SaveStrategy::default(),
            max_files_per_owner: 5,
            snapshot_interval: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Missing variables use their defaults; unparseable values are logged
    /// and replaced by the default so a bad environment never stops the
    /// server from coming up.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = std::env::var("PROGRESS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        Self {
            port: env_parse("SERVER_PORT", defaults.port),
            data_dir,
            strategy: env_parse("SAVE_STRATEGY", defaults.strategy),
            max_files_per_owner: env_parse("MAX_FILES_PER_OWNER", defaults.max_files_per_owner),
            snapshot_interval: Duration::from_secs(env_parse(
                "SNAPSHOT_INTERVAL_SECS",
                defaults.snapshot_interval.as_secs(),
            )),
            poll_interval: Duration::from_secs(env_parse(
                "POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            heartbeat_interval: Duration::from_secs(env_parse(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval.as_secs(),
            )),
        }
    }
}

/// Storage directory used when `PROGRESS_DATA_DIR` is not set
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pathsync")
        .join("progress-data")
}

/// Read and parse an environment variable, falling back to `default`
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "[Server] Invalid {} value '{}', using the default",
                    key,
                    raw
                );
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_configuration() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3004);
        assert_eq!(config.strategy, SaveStrategy::UpdatePerOwner);
        assert_eq!(config.max_files_per_owner, 5);
        assert_eq!(config.snapshot_interval, Duration::from_secs(1800));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        std::env::set_var("SERVER_PORT", "4100");
        std::env::set_var("SAVE_STRATEGY", "always-new");
        std::env::set_var("MAX_FILES_PER_OWNER", "3");
        std::env::set_var("PROGRESS_DATA_DIR", "/tmp/pathsync-test");

        let config = ServerConfig::from_env();
        assert_eq!(config.port, 4100);
        assert_eq!(config.strategy, SaveStrategy::AlwaysNew);
        assert_eq!(config.max_files_per_owner, 3);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/pathsync-test"));

        std::env::remove_var("SERVER_PORT");
        std::env::remove_var("SAVE_STRATEGY");
        std::env::remove_var("MAX_FILES_PER_OWNER");
        std::env::remove_var("PROGRESS_DATA_DIR");
    }

    #[test]
    #[serial]
    fn test_unparseable_value_falls_back() {
        std::env::set_var("SERVER_PORT", "not-a-port");

        let config = ServerConfig::from_env();
        assert_eq!(config.port, 3004);

        std::env::remove_var("SERVER_PORT");
    }
}

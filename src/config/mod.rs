//! Node configuration from command-line flags and environment.
//!
//! Usage:
//!   spark-echo-node [OPTIONS]
//!
//! Options:
//!   --port <PORT>         API port (default: 8080, env SPARK_ECHO_PORT)
//!   --data-dir <PATH>     Data directory (default: ./spark-echo-data, env SPARK_ECHO_DATA_DIR)
//!   --backend <KIND>      json | sled (default: json, env SPARK_ECHO_BACKEND)
//!   --window <MINUTES>    Default active window (default: 30)

use crate::liveness::DEFAULT_ACTIVE_WINDOW_MINUTES;
use crate::storage::BackendKind;

pub const PORT_ENV: &str = "SPARK_ECHO_PORT";
pub const DATA_DIR_ENV: &str = "SPARK_ECHO_DATA_DIR";
pub const BACKEND_ENV: &str = "SPARK_ECHO_BACKEND";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./spark-echo-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub api_port: u16,
    pub data_dir: String,
    pub backend: BackendKind,
    pub active_window_minutes: i64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_port: DEFAULT_PORT,
            data_dir: DEFAULT_DATA_DIR.to_string(),
            backend: BackendKind::Json,
            active_window_minutes: DEFAULT_ACTIVE_WINDOW_MINUTES,
        }
    }
}

impl NodeConfig {
    /// Environment first, then flags on top
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_args(std::env::args().skip(1));
        config
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(PORT_ENV).and_then(|s| s.trim().parse().ok()) {
            self.api_port = port;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV).filter(|s| !s.trim().is_empty()) {
            self.data_dir = dir;
        }
        if let Some(backend) = lookup(BACKEND_ENV).and_then(|s| s.parse().ok()) {
            self.backend = backend;
        }
    }

    /// Unknown flags are ignored; unparsable values fall back to defaults
    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--port" => {
                    self.api_port = args.get(i + 1)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_PORT);
                    i += 1;
                }
                "--data-dir" => {
                    self.data_dir = args.get(i + 1)
                        .cloned()
                        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
                    i += 1;
                }
                "--backend" => {
                    self.backend = args.get(i + 1)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or_default();
                    i += 1;
                }
                "--window" => {
                    self.active_window_minutes = args.get(i + 1)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_ACTIVE_WINDOW_MINUTES);
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.backend, BackendKind::Json);
        assert_eq!(config.active_window_minutes, 30);
    }

    #[test]
    fn test_args_override() {
        let mut config = NodeConfig::default();
        config.apply_args(["--port", "9000", "--backend", "sled", "--data-dir", "/tmp/se", "--window", "5", "--verbose"]);

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.backend, BackendKind::Sled);
        assert_eq!(config.data_dir, "/tmp/se");
        assert_eq!(config.active_window_minutes, 5);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let mut config = NodeConfig::default();
        config.apply_args(["--port", "not-a-port", "--backend", "redis"]);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.backend, BackendKind::Json);
    }

    #[test]
    fn test_env_then_args() {
        let env: HashMap<&str, &str> = [(PORT_ENV, "7000"), (BACKEND_ENV, "sled"), (DATA_DIR_ENV, " ")]
            .into_iter()
            .collect();

        let mut config = NodeConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_port, 7000);
        assert_eq!(config.backend, BackendKind::Sled);
        assert_eq!(config.data_dir, "./spark-echo-data");

        config.apply_args(["--port", "7001"]);
        assert_eq!(config.api_port, 7001);
    }
}

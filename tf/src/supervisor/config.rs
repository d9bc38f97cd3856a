//! Supervisor configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Timing and spawn settings for the worker supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Monitor tick period (T_check)
    #[serde(rename = "check-interval-secs")]
    pub check_interval_secs: u64,

    /// Heartbeat silence treated as a miss (T_timeout)
    #[serde(rename = "heartbeat-timeout-secs")]
    pub heartbeat_timeout_secs: u64,

    /// Misses before termination
    #[serde(rename = "missed-heartbeat-threshold")]
    pub missed_heartbeat_threshold: u32,

    /// Worker executable
    #[serde(rename = "worker-binary")]
    pub worker_binary: PathBuf,

    /// Extra arguments placed before the standard worker flags
    #[serde(rename = "worker-args")]
    pub worker_args: Vec<String>,

    /// Refuse to spawn tasks scoring below the readiness threshold
    #[serde(rename = "enforce-readiness")]
    pub enforce_readiness: bool,

    /// Graceful shutdown deadline
    #[serde(rename = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: u64,

    /// Event queue depth
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            missed_heartbeat_threshold: 3,
            worker_binary: PathBuf::from("taskforge-worker"),
            worker_args: Vec::new(),
            enforce_readiness: true,
            shutdown_timeout_secs: 60,
            channel_buffer: 256,
        }
    }
}

impl SupervisorConfig {
    pub fn heartbeat_timeout_ms(&self) -> i64 {
        (self.heartbeat_timeout_secs * 1000) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_timing_constants() {
        let config = SupervisorConfig::default();
        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.heartbeat_timeout_secs, 90);
        assert_eq!(config.missed_heartbeat_threshold, 3);
        assert!(config.enforce_readiness);
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
check-interval-secs: 5
heartbeat-timeout-secs: 10
worker-binary: /usr/local/bin/forge-worker
"#;
        let config: SupervisorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.check_interval_secs, 5);
        assert_eq!(config.heartbeat_timeout_secs, 10);
        assert_eq!(config.worker_binary, PathBuf::from("/usr/local/bin/forge-worker"));
        // Unspecified fields keep their defaults
        assert_eq!(config.missed_heartbeat_threshold, 3);
    }
}

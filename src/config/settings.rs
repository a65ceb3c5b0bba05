//! Configuration structs - pipeline timing and analysis endpoint as
//! operator-tunable TOML values.
//!
//! Each struct implements `Default` with the original pipeline constants
//! (1 s consolidation tick, 1 s idle threshold), ensuring unchanged behavior
//! when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a mealsnap deployment.
///
/// Load with `AppConfig::load()` which searches:
/// 1. `$MEALSNAP_CONFIG` env var
/// 2. `./mealsnap.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Consolidation and shutdown timing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Analysis collaborator endpoint
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("MEALSNAP_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from MEALSNAP_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from MEALSNAP_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "MEALSNAP_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./mealsnap.toml
        let local = Path::new("mealsnap.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!("Loaded config from ./mealsnap.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./mealsnap.toml, using defaults");
                }
            }
        }

        // 3. Built-in defaults
        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}

// ============================================================================
// Pipeline Timing
// ============================================================================

/// Consolidation timer and shutdown drain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Period of the idle-check timer, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Quiet period after the last item before a group is complete,
    /// in milliseconds.
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,

    /// Upper bound on each remaining analysis call once shutdown has begun,
    /// in milliseconds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_idle_threshold_ms() -> u64 {
    1000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ============================================================================
// Analysis Endpoint
// ============================================================================

/// OpenAI-compatible analysis endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL of the chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout in seconds. 0 disables the timeout entirely,
    /// restoring the stall-forever behavior of an unbounded collaborator.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

use crate::safety::RiskLevel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured API key.
const API_KEY_ENV: &str = "OPSPILOT_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Highest risk the engine will act on at all; anything above is fatal.
    #[serde(default = "default_max_risk")]
    pub max_risk: RiskLevel,
    /// Reasoning-pass budget per request (the forced summarization pass is
    /// in addition to this).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// When set, every instruction executes with dry_run injected.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
    #[serde(default = "default_error_recovery_limit")]
    pub error_recovery_limit: u32,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_provider() -> String {
    "openai-compatible".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_risk() -> RiskLevel {
    RiskLevel::High
}

fn default_max_iterations() -> u32 {
    10
}

fn default_worker_timeout_secs() -> u64 {
    120
}

fn default_error_recovery_limit() -> u32 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            llm: LlmConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_risk: default_max_risk(),
            max_iterations: default_max_iterations(),
            dry_run: false,
            worker_timeout_secs: default_worker_timeout_secs(),
            error_recovery_limit: default_error_recovery_limit(),
        }
    }
}

impl Config {
    /// Platform config path (`~/.config/opspilot/config.toml` on Linux).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "opspilot", "opspilot")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default path, falling back to defaults when no file
    /// exists. The `OPSPILOT_API_KEY` environment variable always wins over
    /// the file's key.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = match path.as_deref().filter(|p| p.exists()) {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.expand_workspace_dir();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
    }

    fn expand_workspace_dir(&mut self) {
        if let Some(raw) = self.workspace_dir.to_str() {
            let expanded = shellexpand::tilde(raw);
            self.workspace_dir = PathBuf::from(expanded.as_ref());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.safety.max_iterations == 0 {
            anyhow::bail!("safety.max_iterations must be >= 1");
        }
        if self.llm.temperature.is_nan() || !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.request_timeout_secs == 0 {
            anyhow::bail!("llm.request_timeout_secs must be >= 1");
        }
        if self.safety.worker_timeout_secs == 0 {
            anyhow::bail!("safety.worker_timeout_secs must be >= 1");
        }
        Ok(())
    }
}

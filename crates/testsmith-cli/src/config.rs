//! Configuration file management for testsmith.
//!
//! Provides a TOML-based config file at `~/.config/testsmith/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use testsmith_core::EngineConfig;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const MODEL_ENV: &str = "TESTSMITH_MODEL";
pub const WORK_DIR_ENV: &str = "TESTSMITH_WORK_DIR";

pub const DEFAULT_WORK_DIR: &str = "storage";
pub const DEFAULT_RUNNER_TIMEOUT_SECS: u64 = 300;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    /// Snippets processed at once; unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_timeout_secs: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the testsmith config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/testsmith` or
/// `~/.config/testsmith`, never the macOS `Application Support` location.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("testsmith");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("testsmith")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file may hold an API key, so it is made owner-only on Unix.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
    pub runner_timeout_secs: Option<u64>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct TestsmithConfig {
    pub api_key: SecretString,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: String,
    pub work_dir: PathBuf,
    pub max_concurrency: Option<usize>,
    pub runner_timeout: Duration,
}

impl TestsmithConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - API key: `ANTHROPIC_API_KEY` env > `llm.api_key` > error
    /// - Model: `--model` > `TESTSMITH_MODEL` env > `llm.model` > built-in default
    /// - Work dir: `--work-dir` > `TESTSMITH_WORK_DIR` env > `pipeline.work_dir` > `storage`
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = if config_path().exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let api_key = match env(API_KEY_ENV).or(file.llm.api_key) {
            Some(key) => SecretString::from(key),
            None => bail!(
                "API key not found; set {API_KEY_ENV} or run `testsmith init --api-key <KEY>`"
            ),
        };

        let model = cli
            .model
            .clone()
            .or_else(|| env(MODEL_ENV))
            .or(file.llm.model)
            .unwrap_or_else(|| EngineConfig::DEFAULT_MODEL.to_string());

        let work_dir = cli
            .work_dir
            .clone()
            .or_else(|| env(WORK_DIR_ENV).map(PathBuf::from))
            .or(file.pipeline.work_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

        let runner_timeout_secs = cli
            .runner_timeout_secs
            .or(file.pipeline.runner_timeout_secs)
            .unwrap_or(DEFAULT_RUNNER_TIMEOUT_SECS);

        Ok(Self {
            api_key,
            model,
            max_tokens: file.llm.max_tokens.unwrap_or(EngineConfig::DEFAULT_MAX_TOKENS),
            temperature: file.llm.temperature.unwrap_or(EngineConfig::DEFAULT_TEMPERATURE),
            base_url: file
                .llm
                .base_url
                .unwrap_or_else(|| EngineConfig::DEFAULT_BASE_URL.to_string()),
            work_dir,
            max_concurrency: cli.max_concurrency.or(file.pipeline.max_concurrency),
            runner_timeout: Duration::from_secs(runner_timeout_secs),
        })
    }

    /// Engine settings for one language's engine.
    ///
    /// Each adapter owns its own engine, so the key is rewrapped per call.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.api_key.expose_secret())
            .model(self.model.clone())
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .base_url(self.base_url.clone())
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

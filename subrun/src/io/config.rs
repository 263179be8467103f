//! Run configuration, optionally loaded from a TOML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Run configuration (TOML).
///
/// Every field has a documented default, so an empty or missing file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Interpreter program plus leading args; the entry file is appended.
    pub interpreter: Vec<String>,

    /// Extension of entry files, without the leading dot.
    pub extension: String,

    /// Per-submission wall-clock budget in milliseconds.
    pub timeout_ms: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Maximum number of submissions running at once.
    pub max_concurrency: usize,

    /// How long to keep draining output after the child ends.
    pub drain_grace_ms: u64,

    /// Environment overrides for every child process.
    pub env: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        Self {
            interpreter: vec!["python3".to_string()],
            extension: "py".to_string(),
            timeout_ms: 10_000,
            output_limit_bytes: 100_000,
            max_concurrency: 4,
            drain_grace_ms: 500,
            env,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interpreter.is_empty() || self.interpreter[0].trim().is_empty() {
            return Err(anyhow!("interpreter must be a non-empty array"));
        }
        if self.extension.trim().is_empty() {
            return Err(anyhow!("extension must be non-empty"));
        }
        if self.extension.starts_with('.') {
            return Err(anyhow!("extension must not start with '.'"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.max_concurrency == 0 {
            return Err(anyhow!("max_concurrency must be > 0"));
        }
        for key in self.env.keys() {
            if key.trim().is_empty() || key.contains('=') {
                return Err(anyhow!("env key {key:?} is invalid"));
            }
        }
        Ok(())
    }

    /// Per-run limits handed to the process runner.
    pub fn limits(&self) -> RunLimits {
        RunLimits {
            timeout: Duration::from_millis(self.timeout_ms),
            output_limit_bytes: self.output_limit_bytes,
            drain_grace: Duration::from_millis(self.drain_grace_ms),
        }
    }
}

/// Limits applied to a single process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Maximum time before killing the process.
    pub timeout: Duration,
    /// Maximum bytes kept from each of stdout/stderr.
    pub output_limit_bytes: usize,
    /// How long to wait for output readers once the process has ended.
    pub drain_grace: Duration,
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        let cfg = RunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Render config as TOML, the same text [`write_config`] stores.
pub fn render_config(cfg: &RunConfig) -> Result<String> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    Ok(buf)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    write_atomic(path, &render_config(cfg)?)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

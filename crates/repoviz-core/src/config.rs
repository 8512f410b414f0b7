use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "repoviz.json";

/// Runtime settings for acquisition, cleanup, and the analysis engine.
/// Every field has a default; a config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Host recognized in full web URLs (e.g. `github.com`).
    pub host: String,
    /// Base that clone and web URLs are built from.
    pub remote_base: String,
    /// Shared root holding one scratch directory per run.
    pub temp_root: PathBuf,
    pub git_bin: PathBuf,
    pub engine_bin: PathBuf,
    /// Model identifier every session is created with.
    pub model: String,
    /// Tools the engine may use without prompting.
    pub allowed_tools: Vec<String>,
    pub clone_timeout_sec: u64,
    pub gc_timeout_sec: u64,
    pub reap_attempts: u32,
    pub reap_backoff_ms: u64,
    /// `None` waits for the engine indefinitely.
    pub session_timeout_sec: Option<u64>,
    /// Upper bound on analyses running at once behind the HTTP endpoint.
    pub max_concurrent: usize,
    /// Characters of the repository name kept in workspace directory names.
    pub name_prefix_len: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            host: crate::repo::DEFAULT_HOST.to_string(),
            remote_base: "https://github.com".to_string(),
            temp_root: default_temp_root(),
            git_bin: PathBuf::from("git"),
            engine_bin: PathBuf::from("claude"),
            model: "sonnet".to_string(),
            allowed_tools: ["Read", "Glob", "Grep", "LS", "WebFetch", "WebSearch"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            clone_timeout_sec: 300,
            gc_timeout_sec: 10,
            reap_attempts: 3,
            reap_backoff_ms: 1000,
            session_timeout_sec: Some(1800),
            max_concurrent: 4,
            name_prefix_len: 20,
        }
    }
}

impl AnalyzerConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path if given, else `<cwd>/repoviz.json` if present, else defaults.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = cwd.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reap_attempts == 0 {
            anyhow::bail!("reap_attempts must be at least 1");
        }
        if self.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be at least 1");
        }
        if self.name_prefix_len == 0 {
            anyhow::bail!("name_prefix_len must be at least 1");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model must not be empty");
        }
        Ok(())
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_sec)
    }

    pub fn gc_timeout(&self) -> Duration {
        Duration::from_secs(self.gc_timeout_sec)
    }

    pub fn reap_backoff(&self) -> Duration {
        Duration::from_millis(self.reap_backoff_ms)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_sec.map(Duration::from_secs)
    }
}

/// `<cache dir>/repoviz/workspaces`, falling back to the system temp dir.
fn default_temp_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("repoviz")
        .join("workspaces")
}

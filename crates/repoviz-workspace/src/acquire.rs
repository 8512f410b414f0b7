use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use repoviz_core::{AnalyzerConfig, RepositoryRef};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::git::{run_git, GitOutput};
use crate::reaper::{ReapOutcome, Reaper};

/// Bound on the best-effort `git restore` after a partial checkout.
const RESTORE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("cannot create workspace root {}: {source}", .path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to clone repository: {0}")]
    CloneFailed(String),
}

// ── Workspace ──

/// A directory holding one cloned snapshot, owned by exactly one run.
///
/// Call [`Workspace::release`] when the run is over. A workspace dropped
/// without being released (e.g. its future was cancelled) is removed with a
/// single synchronous attempt.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    repository: RepositoryRef,
    reaper: Reaper,
    released: bool,
}

impl Workspace {
    pub fn new(path: PathBuf, repository: RepositoryRef, reaper: Reaper) -> Self {
        Self {
            path,
            repository,
            reaper,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    /// Run the reaper on the workspace directory.
    pub async fn release(mut self) -> ReapOutcome {
        info!(path = %self.path.display(), "cleaning up workspace");
        let outcome = self.reaper.reap(&self.path).await;
        self.released = true;
        outcome
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released || !self.path.exists() {
            return;
        }
        warn!(path = %self.path.display(), "workspace dropped without release; removing");
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove dropped workspace");
        }
    }
}

// ── Acquirer ──

/// Produces fresh workspaces by shallow-cloning the remote repository.
#[derive(Debug, Clone)]
pub struct Acquirer {
    root: PathBuf,
    remote_base: String,
    git_bin: PathBuf,
    clone_timeout: Duration,
    name_prefix_len: usize,
    reaper: Reaper,
}

impl Acquirer {
    pub fn new(root: PathBuf, remote_base: impl Into<String>, reaper: Reaper) -> Self {
        Self {
            root,
            remote_base: remote_base.into(),
            git_bin: PathBuf::from("git"),
            clone_timeout: Duration::from_secs(300),
            name_prefix_len: 20,
            reaper,
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            root: config.temp_root.clone(),
            remote_base: config.remote_base.clone(),
            git_bin: config.git_bin.clone(),
            clone_timeout: config.clone_timeout(),
            name_prefix_len: config.name_prefix_len.max(1),
            reaper: Reaper::from_config(config),
        }
    }

    pub fn with_git_bin(mut self, git_bin: PathBuf) -> Self {
        self.git_bin = git_bin;
        self
    }

    pub fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    /// Fresh directory for one run: `<root>/<name prefix>-<ulid>`.
    pub fn workspace_dir(&self, repository: &RepositoryRef) -> PathBuf {
        let prefix: String = repository.name.chars().take(self.name_prefix_len).collect();
        let token = Ulid::new().to_string().to_lowercase();
        self.root.join(format!("{prefix}-{token}"))
    }

    /// Clone `repository` into a new, uniquely named workspace.
    pub async fn acquire(&self, repository: &RepositoryRef) -> Result<Workspace, AcquireError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| AcquireError::Root {
                path: self.root.clone(),
                source,
            })?;
        let path = self.workspace_dir(repository);
        self.acquire_at(repository, path).await
    }

    /// Clone into `path`, destroying anything already there first.
    pub async fn acquire_at(
        &self,
        repository: &RepositoryRef,
        path: PathBuf,
    ) -> Result<Workspace, AcquireError> {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if let ReapOutcome::Abandoned { last_error, .. } = self.reaper.reap(&path).await {
                warn!(path = %path.display(), error = %last_error, "stale workspace still present before clone");
            }
        }

        let url = repository.clone_url(&self.remote_base);
        info!(url = %url, target = %path.display(), "cloning repository");

        let args = [
            OsStr::new("clone"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--single-branch"),
            OsStr::new("--no-tags"),
            OsStr::new("-c"),
            OsStr::new("core.longpaths=true"),
            OsStr::new(&url),
            path.as_os_str(),
        ];
        let cloned = match run_git(&self.git_bin, args, self.clone_timeout).await {
            Ok(out) => out,
            Err(e) => {
                // A killed clone may leave a half-written target behind.
                if let ReapOutcome::Abandoned { last_error, .. } = self.reaper.reap(&path).await {
                    warn!(path = %path.display(), error = %last_error, "partial clone left behind");
                }
                error!(url = %url, error = %e, "clone failed");
                return Err(AcquireError::CloneFailed(e.to_string()));
            }
        };

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let diagnostic = clone_diagnostic(&cloned);
            error!(url = %url, error = %diagnostic, "clone failed");
            return Err(AcquireError::CloneFailed(diagnostic));
        }

        if needs_restore(&cloned) {
            warn!(path = %path.display(), "checkout had issues, attempting recovery");
            self.restore(&path).await;
        }

        info!(path = %path.display(), "repository cloned");
        Ok(Workspace::new(path, repository.clone(), self.reaper.clone()))
    }

    /// Reap every leftover entry under the root. Call only while no run is in
    /// flight; returns how many entries were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            match self.reaper.reap(&path).await {
                ReapOutcome::Removed { .. } => removed += 1,
                ReapOutcome::Absent => {}
                ReapOutcome::Abandoned { last_error, .. } => warn!(
                    path = %path.display(),
                    error = %last_error,
                    "leftover workspace could not be swept"
                ),
            }
        }
        if removed > 0 {
            info!(root = %self.root.display(), removed, "swept leftover workspaces");
        }
        removed
    }

    /// Best-effort `git restore --source=HEAD :/`; failures are only logged.
    async fn restore(&self, path: &Path) {
        let args = [
            OsStr::new("-C"),
            path.as_os_str(),
            OsStr::new("restore"),
            OsStr::new("--source=HEAD"),
            OsStr::new(":/"),
        ];
        match run_git(&self.git_bin, args, RESTORE_TIMEOUT).await {
            Ok(out) if out.success => info!(path = %path.display(), "working tree restored"),
            Ok(out) => warn!(stderr = %out.stderr.trim(), "restore failed; using partial checkout"),
            Err(e) => warn!(error = %e, "restore failed; using partial checkout"),
        }
    }
}

fn clone_diagnostic(cloned: &GitOutput) -> String {
    let stderr = cloned.stderr.trim();
    if stderr.is_empty() {
        format!("git clone exited with code {}", cloned.code.unwrap_or(-1))
    } else {
        stderr.to_string()
    }
}

/// The target exists, but git did not finish cleanly.
fn needs_restore(cloned: &GitOutput) -> bool {
    !cloned.success || cloned.stderr.to_lowercase().contains("checkout failed")
}

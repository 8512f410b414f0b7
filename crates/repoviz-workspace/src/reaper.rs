use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use repoviz_core::AnalyzerConfig;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::git::run_git;

/// Retry policy for workspace removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    /// Bound on the `git gc` run used to release repository locks.
    pub gc_timeout: Duration,
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
            gc_timeout: Duration::from_secs(10),
        }
    }
}

impl ReapPolicy {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            attempts: config.reap_attempts.max(1),
            backoff: config.reap_backoff(),
            gc_timeout: config.gc_timeout(),
        }
    }
}

/// What a removal achieved. Failure is reported here, never as an error.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    Removed { attempts: u32 },
    /// Nothing existed at the path.
    Absent,
    /// Every attempt failed; the directory is left for the next sweep.
    Abandoned { attempts: u32, last_error: String },
}

impl ReapOutcome {
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::Abandoned { .. })
    }
}

/// Deletes workspace directories, tolerating read-only entries and
/// git lock files, with bounded retries.
#[derive(Debug, Clone)]
pub struct Reaper {
    git_bin: PathBuf,
    policy: ReapPolicy,
    remove: fn(&Path) -> io::Result<()>,
}

impl Default for Reaper {
    fn default() -> Self {
        Self::new(PathBuf::from("git"), ReapPolicy::default())
    }
}

impl Reaper {
    pub fn new(git_bin: PathBuf, policy: ReapPolicy) -> Self {
        Self {
            git_bin,
            policy,
            remove: remove_tree,
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(config.git_bin.clone(), ReapPolicy::from_config(config))
    }

    #[cfg(test)]
    fn with_remover(mut self, remove: fn(&Path) -> io::Result<()>) -> Self {
        self.remove = remove;
        self
    }

    /// Remove `path` and everything under it. Safe on paths that do not exist.
    pub async fn reap(&self, path: &Path) -> ReapOutcome {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.remove_once(path).await {
                Ok(false) if attempt == 1 => return ReapOutcome::Absent,
                Ok(_) => {
                    info!(path = %path.display(), attempt, "workspace removed");
                    return ReapOutcome::Removed { attempts: attempt };
                }
                Err(e) => {
                    warn!(path = %path.display(), attempt, error = %e, "cleanup attempt failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        warn!(
            path = %path.display(),
            "could not fully clean up workspace; leaving it for the next sweep"
        );
        ReapOutcome::Abandoned {
            attempts,
            last_error,
        }
    }

    /// One removal attempt. `Ok(false)` means there was nothing to remove.
    async fn remove_once(&self, path: &Path) -> io::Result<bool> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        }

        if tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false) {
            self.release_locks(path).await;
        }

        let target = path.to_path_buf();
        let remove = self.remove;
        tokio::task::spawn_blocking(move || remove(&target))
            .await
            .map_err(io::Error::other)??;
        Ok(true)
    }

    /// Best-effort `git gc --prune=now` so stale pack/lock handles are let go.
    async fn release_locks(&self, path: &Path) {
        let args = [
            OsStr::new("-C"),
            path.as_os_str(),
            OsStr::new("gc"),
            OsStr::new("--prune=now"),
        ];
        match run_git(&self.git_bin, args, self.policy.gc_timeout).await {
            Ok(out) if out.success => debug!(path = %path.display(), "git gc released locks"),
            Ok(out) => debug!(stderr = %out.stderr.trim(), "git gc failed; continuing"),
            Err(e) => debug!(error = %e, "git gc unavailable; continuing"),
        }
    }
}

/// Clear read-only bits on every entry, then remove the tree.
fn remove_tree(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        make_writable(path);
        return fs::remove_file(path);
    }
    for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if !entry.path_is_symlink() {
            make_writable(entry.path());
        }
    }
    fs::remove_dir_all(path)
}

#[cfg(unix)]
fn make_writable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    let mut perms = meta.permissions();
    let mode = perms.mode();
    if mode & 0o200 != 0 {
        return;
    }
    perms.set_mode(mode | 0o200);
    let _ = fs::set_permissions(path, perms);
}

#[cfg(not(unix))]
fn make_writable(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    let mut perms = meta.permissions();
    if !perms.readonly() {
        return;
    }
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    let _ = fs::set_permissions(path, perms);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_reaper() -> Reaper {
        Reaper::new(
            PathBuf::from("git"),
            ReapPolicy {
                attempts: 3,
                backoff: Duration::from_millis(10),
                gc_timeout: Duration::from_secs(10),
            },
        )
    }

    #[tokio::test]
    async fn missing_path_is_noop_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("never-created");
        let reaper = fast_reaper();
        assert_eq!(reaper.reap(&path).await, ReapOutcome::Absent);
        assert_eq!(reaper.reap(&path).await, ReapOutcome::Absent);
    }

    #[tokio::test]
    async fn removes_nested_tree_then_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/b/c/file.txt"), "x").unwrap();
        fs::write(root.join("top.txt"), "y").unwrap();

        let reaper = fast_reaper();
        assert_eq!(reaper.reap(&root).await, ReapOutcome::Removed { attempts: 1 });
        assert!(!root.exists());
        assert_eq!(reaper.reap(&root).await, ReapOutcome::Absent);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn removes_read_only_entries() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");
        let locked_dir = root.join("objects/pack");
        fs::create_dir_all(&locked_dir).unwrap();
        let packed = locked_dir.join("pack-1.idx");
        fs::write(&packed, "idx").unwrap();
        fs::set_permissions(&packed, fs::Permissions::from_mode(0o444)).unwrap();
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o555)).unwrap();

        let outcome = fast_reaper().reap(&root).await;
        assert!(outcome.is_clean(), "{outcome:?}");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn removes_git_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("checkout");
        fs::create_dir_all(&root).unwrap();
        let status = std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(&root)
            .status()
            .unwrap();
        assert!(status.success());
        fs::write(root.join("README.md"), "hi").unwrap();

        let outcome = fast_reaper().reap(&root).await;
        assert!(matches!(outcome, ReapOutcome::Removed { .. }), "{outcome:?}");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn removes_plain_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stray");
        fs::write(&path, "leftover").unwrap();
        assert!(fast_reaper().reap(&path).await.is_clean());
        assert!(!path.exists());
    }

    fn always_busy(_: &Path) -> io::Result<()> {
        Err(io::Error::other("directory is busy"))
    }

    /// Fails while a `busy` marker exists, consuming the marker.
    fn busy_once(path: &Path) -> io::Result<()> {
        let marker = path.join("busy");
        if marker.exists() {
            fs::remove_file(&marker)?;
            return Err(io::Error::other("directory is busy"));
        }
        remove_tree(path)
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_is_abandoned_after_backoff() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");
        fs::create_dir_all(root.join("src")).unwrap();

        let reaper = Reaper::new(
            PathBuf::from("git"),
            ReapPolicy {
                attempts: 3,
                backoff: Duration::from_secs(1),
                gc_timeout: Duration::from_secs(10),
            },
        )
        .with_remover(always_busy);

        let started = tokio::time::Instant::now();
        let outcome = reaper.reap(&root).await;
        let elapsed = started.elapsed();

        assert_eq!(
            outcome,
            ReapOutcome::Abandoned {
                attempts: 3,
                last_error: "directory is busy".into(),
            }
        );
        // Two waits between three attempts, none after the last.
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("ws");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("busy"), "").unwrap();

        let outcome = fast_reaper().with_remover(busy_once).reap(&root).await;
        assert_eq!(outcome, ReapOutcome::Removed { attempts: 2 });
        assert!(!root.exists());
    }

    #[test]
    fn abandoned_is_not_clean() {
        let outcome = ReapOutcome::Abandoned {
            attempts: 3,
            last_error: "busy".into(),
        };
        assert!(!outcome.is_clean());
        assert!(ReapOutcome::Absent.is_clean());
        assert!(ReapOutcome::Removed { attempts: 2 }.is_clean());
    }

    #[test]
    fn policy_from_config() {
        let config = AnalyzerConfig {
            reap_attempts: 5,
            reap_backoff_ms: 250,
            gc_timeout_sec: 3,
            ..AnalyzerConfig::default()
        };
        let policy = ReapPolicy::from_config(&config);
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(policy.gc_timeout, Duration::from_secs(3));
    }
}

//! Repository snapshots for a single analysis run.
//!
//! [`Acquirer`] clones a shallow snapshot into a fresh directory under a shared
//! temp root and hands back a [`Workspace`] guard. [`Reaper`] removes such
//! directories, working around read-only files and lingering git locks.

pub mod acquire;
pub mod git;
pub mod reaper;

pub use acquire::{AcquireError, Acquirer, Workspace};
pub use git::{GitError, GitOutput};
pub use reaper::{ReapOutcome, ReapPolicy, Reaper};

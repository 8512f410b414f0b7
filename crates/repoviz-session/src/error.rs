use std::time::Duration;

use repoviz_workspace::AcquireError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("analysis engine error: {0:#}")]
    Engine(anyhow::Error),
    #[error("analysis session failed: {0}")]
    Failed(String),
    #[error("analysis session timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("analysis session was cancelled")]
    Cancelled,
    #[error("analysis session ended before it went idle")]
    Incomplete,
}

/// Anything that can make an analysis run fail (input errors are not
/// failures; they produce a regular result).
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

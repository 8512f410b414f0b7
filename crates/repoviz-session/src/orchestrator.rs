use std::future::pending;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use repoviz_core::{AnalysisMode, AnalysisRequest, AnalysisResult, AnalyzerConfig};
use repoviz_workspace::{ReapOutcome, Workspace};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{AnalysisEngine, SessionConfig, SessionEvent};
use crate::error::SessionError;
use crate::prompts::build_instruction;
use crate::tracker::SessionTracker;

/// Drives one analysis session from engine start to workspace cleanup.
pub struct Orchestrator {
    engine: Arc<dyn AnalysisEngine>,
    model: String,
    web_base: String,
    session_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn AnalysisEngine>, model: impl Into<String>) -> Self {
        Self {
            engine,
            model: model.into(),
            web_base: AnalyzerConfig::default().remote_base,
            session_timeout: None,
        }
    }

    pub fn from_config(engine: Arc<dyn AnalysisEngine>, config: &AnalyzerConfig) -> Self {
        Self::new(engine, config.model.clone())
            .with_web_base(config.remote_base.clone())
            .with_session_timeout(config.session_timeout())
    }

    /// Base URL remote-mode instructions point the engine at.
    pub fn with_web_base(mut self, web_base: impl Into<String>) -> Self {
        self.web_base = web_base.into();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Run `request` to completion.
    ///
    /// The session is destroyed and the engine stopped on every path that
    /// returns; after that, `workspace` (if any) is released.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        workspace: Option<Workspace>,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, SessionError> {
        let cwd = match request.mode {
            AnalysisMode::Local => workspace.as_ref().map(|w| w.path().to_path_buf()),
            AnalysisMode::Remote => None,
        };
        let outcome = self.drive(request, cwd, cancel).await;

        if let Some(workspace) = workspace {
            if let ReapOutcome::Abandoned {
                attempts,
                last_error,
            } = workspace.release().await
            {
                warn!(attempts, error = %last_error, "workspace left behind after analysis");
            }
        }
        outcome
    }

    async fn drive(
        &self,
        request: &AnalysisRequest,
        cwd: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, SessionError> {
        let tracker = Arc::new(SessionTracker::new());
        let conversed = match self.engine.start().await {
            Ok(()) => self.converse(request, cwd, &tracker, cancel).await,
            Err(e) => Err(SessionError::Engine(e)),
        };
        if let Err(e) = self.engine.stop().await {
            warn!(error = %e, "failed to stop analysis engine");
        }
        conversed?;
        tracker.finish(request.repository.clone())
    }

    async fn converse(
        &self,
        request: &AnalysisRequest,
        cwd: Option<PathBuf>,
        tracker: &Arc<SessionTracker>,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let instruction = build_instruction(request, cwd.as_deref(), &self.web_base);
        let config = SessionConfig {
            model: self.model.clone(),
            cwd,
        };
        let mut session = self
            .engine
            .create_session(&config)
            .await
            .map_err(SessionError::Engine)?;

        let sink = Arc::clone(tracker);
        session.on(Arc::new(move |event: SessionEvent| sink.observe(event)));

        info!(
            repository = %request.repository,
            kind = request.kind.as_str(),
            model = %self.model,
            "sending analysis instruction"
        );
        let waited = match session.send(&instruction).await {
            Ok(()) => self.await_terminal(tracker, cancel).await,
            Err(e) => Err(SessionError::Engine(e)),
        };

        if let Err(e) = session.destroy().await {
            warn!(error = %e, "failed to destroy analysis session");
        }
        waited
    }

    async fn await_terminal(
        &self,
        tracker: &SessionTracker,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let deadline = async {
            match self.session_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tracker.wait_terminal() => Ok(()),
            _ = deadline => {
                let limit = self.session_timeout.unwrap_or_default();
                warn!(seconds = limit.as_secs(), "analysis session timed out");
                Err(SessionError::TimedOut(limit))
            }
            _ = cancel.cancelled() => {
                info!("analysis session cancelled");
                Err(SessionError::Cancelled)
            }
        }
    }
}

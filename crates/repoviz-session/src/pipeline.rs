use std::sync::Arc;

use repoviz_core::{
    AnalysisKind, AnalysisMode, AnalysisRequest, AnalysisResult, AnalyzerConfig, RepoUrlParser,
};
use repoviz_workspace::Acquirer;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::AnalysisEngine;
use crate::error::AnalyzeError;
use crate::orchestrator::Orchestrator;

/// Parse, acquire, orchestrate, clean up: one call per analysis request.
pub struct Analyzer {
    parser: RepoUrlParser,
    acquirer: Acquirer,
    orchestrator: Orchestrator,
}

impl Analyzer {
    pub fn new(config: &AnalyzerConfig, engine: Arc<dyn AnalysisEngine>) -> Self {
        Self::from_parts(
            RepoUrlParser::new(&config.host),
            Acquirer::from_config(config),
            Orchestrator::from_config(engine, config),
        )
    }

    pub fn from_parts(
        parser: RepoUrlParser,
        acquirer: Acquirer,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            parser,
            acquirer,
            orchestrator,
        }
    }

    /// Analyze the repository named by `raw_ref`.
    ///
    /// A reference that does not parse is not an error: it yields the fixed
    /// invalid-URL result without touching the filesystem or the engine.
    pub async fn analyze(
        &self,
        raw_ref: &str,
        kind: AnalysisKind,
        mode: AnalysisMode,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let Some(repository) = self.parser.parse(raw_ref) else {
            info!(input = %raw_ref, "unrecognized repository reference");
            return Ok(AnalysisResult::invalid_reference());
        };
        let request = AnalysisRequest::new(repository, kind).with_mode(mode);
        self.run(&request, cancel).await
    }

    /// Remove workspaces left behind by earlier runs. Call before serving.
    pub async fn sweep_leftovers(&self) -> usize {
        self.acquirer.sweep().await
    }

    pub async fn run(
        &self,
        request: &AnalysisRequest,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, AnalyzeError> {
        info!(
            repository = %request.repository,
            kind = request.kind.as_str(),
            mode = ?request.mode,
            "analysis requested"
        );
        let workspace = match request.mode {
            AnalysisMode::Local => Some(self.acquirer.acquire(&request.repository).await?),
            AnalysisMode::Remote => None,
        };
        let result = self.orchestrator.run(request, workspace, cancel).await?;
        info!(repository = %request.repository, "analysis complete");
        Ok(result)
    }
}

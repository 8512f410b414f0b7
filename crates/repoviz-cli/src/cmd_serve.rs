use std::sync::Arc;

use repoviz_core::AnalyzerConfig;
use repoviz_serve::ServeConfig;
use repoviz_session::{Analyzer, ClaudeCodeEngine};
use tokio_util::sync::CancellationToken;

use crate::ctrlc_cancel;

pub fn execute(config: AnalyzerConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let serve_config = ServeConfig {
        bind: bind.to_string(),
        port,
        max_concurrent: config.max_concurrent,
    };
    let engine = Arc::new(ClaudeCodeEngine::from_config(&config));
    let analyzer = Arc::new(Analyzer::new(&config, engine));

    let shutdown = CancellationToken::new();
    ctrlc_cancel(shutdown.clone());

    tokio::runtime::Runtime::new()?.block_on(async move {
        analyzer.sweep_leftovers().await;
        repoviz_serve::serve(serve_config, analyzer, shutdown).await
    })
}

use std::sync::Arc;

use anyhow::Result;
use repoviz_core::{AnalysisKind, AnalysisMode, AnalysisResult, AnalyzerConfig, EventRecord};
use repoviz_session::{Analyzer, ClaudeCodeEngine};
use tokio_util::sync::CancellationToken;

use crate::ctrlc_cancel;

/// Execute `repoviz analyze <repo>`
pub fn execute(
    config: AnalyzerConfig,
    repo: &str,
    kind: &str,
    remote: bool,
    json: bool,
) -> Result<()> {
    let kind = AnalysisKind::parse_lossy(kind);
    let mode = if remote {
        AnalysisMode::Remote
    } else {
        AnalysisMode::Local
    };
    let engine = Arc::new(ClaudeCodeEngine::from_config(&config));
    let analyzer = Analyzer::new(&config, engine);

    // Ctrl+C cancels the session; teardown and cleanup still run.
    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(analyzer.analyze(repo, kind, mode, cancel))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_text(&result));
    }
    Ok(())
}

/// Human-readable rendering: a one-line tool summary, then the response.
fn render_text(result: &AnalysisResult) -> String {
    let mut out = String::new();
    if let Some(repo) = &result.repository {
        out.push_str(&format!("Repository: {repo}\n"));
    }
    let tools: Vec<&str> = result
        .events
        .iter()
        .filter_map(|e| match e {
            EventRecord::ToolStart { tool_name, .. } => Some(tool_name.as_str()),
            _ => None,
        })
        .collect();
    if !tools.is_empty() {
        out.push_str(&format!("Tools used ({}): {}\n", tools.len(), tools.join(", ")));
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&result.response);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use repoviz_core::RepositoryRef;

    #[test]
    fn render_lists_tools_then_response() {
        let result = AnalysisResult::from_fragments(
            &["A widget library.".to_string()],
            vec![
                EventRecord::ToolStart {
                    tool_name: "LS".into(),
                    tool_call_id: Some("t1".into()),
                },
                EventRecord::ToolComplete {
                    tool_call_id: "t1".into(),
                    result: None,
                },
                EventRecord::ToolStart {
                    tool_name: "Read".into(),
                    tool_call_id: Some("t2".into()),
                },
                EventRecord::SessionIdle,
            ],
            RepositoryRef::new("acme", "widgets"),
        );
        assert_eq!(
            render_text(&result),
            "Repository: acme/widgets\nTools used (2): LS, Read\n\nA widget library.\n"
        );
    }

    #[test]
    fn render_invalid_reference_is_just_the_message() {
        let result = AnalysisResult::invalid_reference();
        assert_eq!(render_text(&result), format!("{}\n", result.response));
    }
}

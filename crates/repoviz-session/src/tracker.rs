//! Folds a session's event stream into an [`AnalysisResult`].
//!
//! [`SessionTracker`] is the only place session output is mutated. The
//! registered event handler forwards every event to [`SessionTracker::observe`];
//! the orchestrator awaits [`SessionTracker::wait_terminal`] and then takes the
//! result with [`SessionTracker::finish`], which refuses to hand out a buffer
//! before the session went idle.

use std::sync::{Mutex, MutexGuard};

use repoviz_core::{AnalysisResult, EventRecord, RepositoryRef};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::SessionEvent;
use crate::error::SessionError;

/// Longest tool result printed to the log.
const MAX_DISPLAY_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No event seen yet.
    Awaiting,
    Active,
    Idle,
    Failed,
}

impl SessionPhase {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

#[derive(Debug)]
struct TrackerState {
    phase: SessionPhase,
    fragments: Vec<String>,
    events: Vec<EventRecord>,
    completion_signals: u32,
    error: Option<String>,
    finished: bool,
}

#[derive(Debug)]
pub struct SessionTracker {
    state: Mutex<TrackerState>,
    done: watch::Sender<bool>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            state: Mutex::new(TrackerState {
                phase: SessionPhase::Awaiting,
                fragments: Vec::new(),
                events: Vec::new(),
                completion_signals: 0,
                error: None,
                finished: false,
            }),
            done,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// How many times the completion signal was raised (0 or 1).
    pub fn completion_signals(&self) -> u32 {
        self.lock().completion_signals
    }

    /// Number of records in the event log so far.
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Classify one event. Called from the session's event handler.
    pub fn observe(&self, event: SessionEvent) {
        let mut state = self.lock();
        if state.finished {
            debug!(kind = event.kind(), "event after result was taken; dropped");
            return;
        }
        if state.phase == SessionPhase::Awaiting {
            state.phase = SessionPhase::Active;
        }

        let signal = match event {
            SessionEvent::AssistantMessage { content } => {
                state.fragments.push(content);
                false
            }
            SessionEvent::MessageDelta { delta_content } => {
                if let Some(content) = delta_content.filter(|d| !d.is_empty()) {
                    state.events.push(EventRecord::MessageDelta { content });
                }
                false
            }
            SessionEvent::ToolExecutionStart {
                tool_name,
                tool_call_id,
                arguments,
            } => {
                let arguments = arguments
                    .as_ref()
                    .map(serde_json::Value::to_string)
                    .unwrap_or_default();
                info!(
                    tool = %tool_name,
                    call_id = tool_call_id.as_deref().unwrap_or("-"),
                    arguments = %arguments,
                    "tool called"
                );
                state.events.push(EventRecord::ToolStart {
                    tool_name,
                    tool_call_id,
                });
                false
            }
            SessionEvent::ToolExecutionComplete {
                tool_call_id,
                result,
            } => {
                info!(call_id = %tool_call_id, result = %display_result(result.as_ref()), "tool result");
                state.events.push(EventRecord::ToolComplete {
                    tool_call_id,
                    result,
                });
                false
            }
            SessionEvent::SessionIdle => {
                state.events.push(EventRecord::SessionIdle);
                if state.phase.is_terminal() {
                    debug!("repeated idle event ignored");
                    false
                } else {
                    state.phase = SessionPhase::Idle;
                    true
                }
            }
            SessionEvent::SessionError { message } => {
                if state.phase.is_terminal() {
                    warn!(error = %message, "engine error after session ended; ignored");
                    false
                } else {
                    warn!(error = %message, "engine reported a session error");
                    state.phase = SessionPhase::Failed;
                    state.error = Some(message);
                    true
                }
            }
        };

        if signal {
            state.completion_signals += 1;
            drop(state);
            self.done.send_replace(true);
        }
    }

    /// Resolve once the session reached `Idle` or `Failed`.
    pub async fn wait_terminal(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Take the final result. Only an idle session yields one.
    pub fn finish(&self, repository: RepositoryRef) -> Result<AnalysisResult, SessionError> {
        let mut state = self.lock();
        match state.phase {
            SessionPhase::Idle if !state.finished => {
                state.finished = true;
                let fragments = std::mem::take(&mut state.fragments);
                let events = std::mem::take(&mut state.events);
                Ok(AnalysisResult::from_fragments(&fragments, events, repository))
            }
            SessionPhase::Failed => Err(SessionError::Failed(
                state.error.clone().unwrap_or_else(|| "unknown error".into()),
            )),
            _ => Err(SessionError::Incomplete),
        }
    }
}

/// Tool result as printed to the log, cut at `MAX_DISPLAY_CHARS`.
fn display_result(result: Option<&Value>) -> String {
    let text = match result {
        None | Some(Value::Null) => return "No result".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    };
    let total = text.chars().count();
    if total <= MAX_DISPLAY_CHARS {
        return text;
    }
    let head: String = text.chars().take(MAX_DISPLAY_CHARS).collect();
    format!("{head}...\n[TRUNCATED - {total} chars total]")
}

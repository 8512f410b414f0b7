use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// One unit of the engine's streamed output.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A complete assistant message.
    AssistantMessage { content: String },
    /// Incremental text of a message still being generated.
    MessageDelta { delta_content: Option<String> },
    ToolExecutionStart {
        tool_name: String,
        tool_call_id: Option<String>,
        arguments: Option<Value>,
    },
    ToolExecutionComplete {
        tool_call_id: String,
        result: Option<Value>,
    },
    /// No further output is expected.
    SessionIdle,
    /// The engine gave up; no further output is expected.
    SessionError { message: String },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssistantMessage { .. } => "assistant.message",
            Self::MessageDelta { .. } => "assistant.message_delta",
            Self::ToolExecutionStart { .. } => "tool.execution_start",
            Self::ToolExecutionComplete { .. } => "tool.execution_complete",
            Self::SessionIdle => "session.idle",
            Self::SessionError { .. } => "session.error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionIdle | Self::SessionError { .. })
    }
}

/// Callback receiving every event of a session, in order.
pub type EventHandler = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Settings a session is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model: String,
    /// Directory the engine works in; `None` inherits the process cwd.
    pub cwd: Option<PathBuf>,
}

/// Client side of an external analysis engine.
/// Implemented by `ClaudeCodeEngine` (real) and `ScriptedEngine` (tests).
#[async_trait::async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn create_session(&self, config: &SessionConfig) -> Result<Box<dyn EngineSession>>;
    async fn stop(&self) -> Result<()>;
}

/// One conversational exchange, bounded by creation and `destroy`.
#[async_trait::async_trait]
pub trait EngineSession: Send {
    /// Subscribe to the session's events. Must happen before `send`.
    fn on(&mut self, handler: EventHandler);
    async fn send(&mut self, instruction: &str) -> Result<()>;
    async fn destroy(&mut self) -> Result<()>;
}

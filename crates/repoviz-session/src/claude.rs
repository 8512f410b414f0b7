//! Analysis engine backed by the Claude Code CLI (`claude -p`).
//!
//! Each session spawns one process in `--output-format stream-json` mode and
//! translates its stdout, line by line, into [`SessionEvent`]s. The `result`
//! line maps to `SessionIdle`; a process that exits without one produces a
//! `SessionError` so the caller is never left waiting.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use repoviz_core::AnalyzerConfig;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::{AnalysisEngine, EngineSession, EventHandler, SessionConfig, SessionEvent};

/// Relevant fields from Claude Code's stream-json output.
/// Unknown message types deserialize to `Unknown` and are skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamMessage {
    #[serde(rename = "system")]
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    #[serde(rename = "assistant")]
    Assistant { message: Value },
    #[serde(rename = "user")]
    User {
        #[serde(default)]
        message: Value,
    },
    /// Raw API stream event, emitted with `--include-partial-messages`.
    #[serde(rename = "stream_event")]
    StreamEvent { event: Value },
    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        error: Option<String>,
        #[serde(default, rename = "result")]
        result_text: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

fn content_blocks(message: &Value) -> &[Value] {
    message
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Map one stream line to zero or more session events.
pub fn translate(msg: StreamMessage) -> Vec<SessionEvent> {
    match msg {
        StreamMessage::System { subtype, model } => {
            debug!(
                subtype = subtype.as_deref().unwrap_or("-"),
                model = model.as_deref().unwrap_or("-"),
                "engine system message"
            );
            Vec::new()
        }
        StreamMessage::Assistant { message } => content_blocks(&message)
            .iter()
            .filter_map(|block| match str_field(block, "type") {
                Some("text") => str_field(block, "text")
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| SessionEvent::AssistantMessage {
                        content: t.to_string(),
                    }),
                Some("tool_use") => Some(SessionEvent::ToolExecutionStart {
                    tool_name: str_field(block, "name").unwrap_or("unknown").to_string(),
                    tool_call_id: str_field(block, "id").map(str::to_string),
                    arguments: block.get("input").cloned(),
                }),
                _ => None,
            })
            .collect(),
        // A bare string body is the echoed prompt, not a tool result.
        StreamMessage::User { message } => content_blocks(&message)
            .iter()
            .filter(|block| str_field(block, "type") == Some("tool_result"))
            .map(|block| SessionEvent::ToolExecutionComplete {
                tool_call_id: str_field(block, "tool_use_id").unwrap_or_default().to_string(),
                result: block.get("content").cloned(),
            })
            .collect(),
        StreamMessage::StreamEvent { event } => {
            if str_field(&event, "type") != Some("content_block_delta") {
                return Vec::new();
            }
            let Some(delta) = event.get("delta") else {
                return Vec::new();
            };
            if str_field(delta, "type") != Some("text_delta") {
                return Vec::new();
            }
            vec![SessionEvent::MessageDelta {
                delta_content: str_field(delta, "text").map(str::to_string),
            }]
        }
        StreamMessage::Result {
            subtype,
            is_error,
            error,
            result_text,
        } => {
            if subtype == "success" && !is_error {
                vec![SessionEvent::SessionIdle]
            } else {
                let detail = error
                    .or(result_text)
                    .unwrap_or_else(|| "no details".to_string());
                vec![SessionEvent::SessionError {
                    message: format!("{subtype}: {detail}"),
                }]
            }
        }
        StreamMessage::Unknown => Vec::new(),
    }
}

/// Read stream-json lines until EOF, forwarding translated events to `handler`.
/// Emits a `SessionError` if the stream ends without a terminal event.
pub async fn pump_events<R>(reader: R, handler: EventHandler)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut terminal = false;
    let ended = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                // Non-JSON lines are ignored (stderr leakage, debug output).
                let Ok(msg) = serde_json::from_str::<StreamMessage>(trimmed) else {
                    debug!(line = %trimmed, "ignoring non-JSON engine output");
                    continue;
                };
                for event in translate(msg) {
                    terminal |= event.is_terminal();
                    handler(event);
                }
            }
            Ok(None) => break "engine exited without a result".to_string(),
            Err(e) => break format!("failed to read engine output: {e}"),
        }
    };
    if !terminal {
        handler(SessionEvent::SessionError { message: ended });
    }
}

/// Launches `claude -p` processes, one per session.
#[derive(Debug, Clone)]
pub struct ClaudeCodeEngine {
    pub bin: PathBuf,
    pub allowed_tools: Vec<String>,
}

impl Default for ClaudeCodeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeCodeEngine {
    pub fn new() -> Self {
        Self::with_bin(PathBuf::from("claude"))
    }

    pub fn with_bin(bin: PathBuf) -> Self {
        Self {
            bin,
            allowed_tools: Vec::new(),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            bin: config.engine_bin.clone(),
            allowed_tools: config.allowed_tools.clone(),
        }
    }

    /// Check that the Claude CLI binary is reachable.
    pub async fn verify_available(&self) -> Result<()> {
        let status = Command::new(&self.bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => bail!(
                "Claude CLI not found (looked for {:?}).\n\
                 Install: npm install -g @anthropic-ai/claude-code",
                self.bin
            ),
        }
    }
}

#[async_trait::async_trait]
impl AnalysisEngine for ClaudeCodeEngine {
    async fn start(&self) -> Result<()> {
        self.verify_available().await
    }

    async fn create_session(&self, config: &SessionConfig) -> Result<Box<dyn EngineSession>> {
        Ok(Box::new(ClaudeCodeSession {
            bin: self.bin.clone(),
            allowed_tools: self.allowed_tools.clone(),
            config: config.clone(),
            session_id: Uuid::new_v4(),
            handler: None,
            child: None,
            reader: None,
        }))
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ClaudeCodeSession {
    bin: PathBuf,
    allowed_tools: Vec<String>,
    config: SessionConfig,
    session_id: Uuid,
    handler: Option<EventHandler>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl ClaudeCodeSession {
    fn command(&self, instruction: &str) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-p")
            .arg(instruction)
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--include-partial-messages")
            .arg("--model")
            .arg(&self.config.model)
            .arg("--session-id")
            .arg(self.session_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            // Allow nesting: remove markers that prevent Claude Code from spawning
            .env_remove("CLAUDE_CODE")
            .env_remove("CLAUDECODE");
        if !self.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(self.allowed_tools.join(","));
        }
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

#[async_trait::async_trait]
impl EngineSession for ClaudeCodeSession {
    fn on(&mut self, handler: EventHandler) {
        self.handler = Some(handler);
    }

    async fn send(&mut self, instruction: &str) -> Result<()> {
        let Some(handler) = self.handler.clone() else {
            bail!("no event handler registered before send");
        };
        if self.child.is_some() {
            bail!("session {} already has an instruction in flight", self.session_id);
        }

        let mut child = self
            .command(instruction)
            .spawn()
            .with_context(|| format!("failed to launch {}", self.bin.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to capture stdout"))?;
        info!(session = %self.session_id, model = %self.config.model, "engine session started");

        self.reader = Some(tokio::spawn(pump_events(BufReader::new(stdout), handler)));
        self.child = Some(child);
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        // No events are delivered once destroy has begun.
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    if let Err(e) = child.kill().await {
                        warn!(session = %self.session_id, error = %e, "failed to kill engine process");
                    }
                }
                Err(e) => {
                    warn!(session = %self.session_id, error = %e, "cannot poll engine process; killing");
                    child.start_kill().ok();
                }
            }
        }
        debug!(session = %self.session_id, "engine session destroyed");
        Ok(())
    }
}

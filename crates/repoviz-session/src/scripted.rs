//! In-process engine that replays a fixed event script.
//!
//! Used by tests across the workspace. Every lifecycle call is written to a
//! shared journal so callers can assert on ordering.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::task::JoinHandle;

use crate::engine::{AnalysisEngine, EngineSession, EventHandler, SessionConfig, SessionEvent};

/// Lifecycle step at which a [`ScriptedEngine`] reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Start,
    CreateSession,
    Send,
}

#[derive(Debug, Default)]
struct Journal {
    calls: Mutex<Vec<&'static str>>,
    instructions: Mutex<Vec<String>>,
    configs: Mutex<Vec<SessionConfig>>,
}

impl Journal {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    script: Arc<Vec<SessionEvent>>,
    fail_at: Option<FailAt>,
    journal: Arc<Journal>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<SessionEvent>) -> Self {
        Self {
            script: Arc::new(script),
            fail_at: None,
            journal: Arc::default(),
        }
    }

    /// Streams `text` as a delta, then as a final message, then goes idle.
    pub fn answering(text: &str) -> Self {
        Self::new(vec![
            SessionEvent::MessageDelta {
                delta_content: Some(text.to_string()),
            },
            SessionEvent::AssistantMessage {
                content: text.to_string(),
            },
            SessionEvent::SessionIdle,
        ])
    }

    pub fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Lifecycle calls so far: `start`, `create_session`, `on`, `send`,
    /// `destroy`, `stop`.
    pub fn journal(&self) -> Vec<&'static str> {
        self.journal
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every instruction passed to `send`.
    pub fn instructions(&self) -> Vec<String> {
        self.journal
            .instructions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every config passed to `create_session`.
    pub fn configs(&self) -> Vec<SessionConfig> {
        self.journal
            .configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl AnalysisEngine for ScriptedEngine {
    async fn start(&self) -> Result<()> {
        self.journal.record("start");
        if self.fail_at == Some(FailAt::Start) {
            bail!("scripted engine refused to start");
        }
        Ok(())
    }

    async fn create_session(&self, config: &SessionConfig) -> Result<Box<dyn EngineSession>> {
        self.journal.record("create_session");
        self.journal
            .configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(config.clone());
        if self.fail_at == Some(FailAt::CreateSession) {
            bail!("scripted engine refused to create a session");
        }
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
            fail_send: self.fail_at == Some(FailAt::Send),
            journal: Arc::clone(&self.journal),
            handler: None,
            emitter: None,
        }))
    }

    async fn stop(&self) -> Result<()> {
        self.journal.record("stop");
        Ok(())
    }
}

struct ScriptedSession {
    script: Arc<Vec<SessionEvent>>,
    fail_send: bool,
    journal: Arc<Journal>,
    handler: Option<EventHandler>,
    emitter: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl EngineSession for ScriptedSession {
    fn on(&mut self, handler: EventHandler) {
        self.journal.record("on");
        self.handler = Some(handler);
    }

    async fn send(&mut self, instruction: &str) -> Result<()> {
        self.journal.record("send");
        self.journal
            .instructions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(instruction.to_string());
        if self.fail_send {
            bail!("scripted engine rejected the instruction");
        }
        let Some(handler) = self.handler.clone() else {
            bail!("no event handler registered before send");
        };
        let script = Arc::clone(&self.script);
        // Events arrive asynchronously, as they would from a real engine.
        self.emitter = Some(tokio::spawn(async move {
            for event in script.iter().cloned() {
                tokio::task::yield_now().await;
                handler(event);
            }
        }));
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.journal.record("destroy");
        if let Some(emitter) = self.emitter.take() {
            emitter.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            model: "sonnet".into(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn replays_script_to_handler() {
        let engine = ScriptedEngine::answering("hello");
        engine.start().await.unwrap();
        let mut session = engine.create_session(&config()).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        session.on(Arc::new(move |e: SessionEvent| {
            let _ = tx.send(e);
        }));
        session.send("describe").await.unwrap();

        let mut seen = Vec::new();
        while let Some(e) = rx.recv().await {
            let done = e.is_terminal();
            seen.push(e);
            if done {
                break;
            }
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], SessionEvent::SessionIdle);

        session.destroy().await.unwrap();
        engine.stop().await.unwrap();
        assert_eq!(
            engine.journal(),
            ["start", "create_session", "on", "send", "destroy", "stop"]
        );
        assert_eq!(engine.instructions(), ["describe"]);
        assert_eq!(engine.configs(), [config()]);
    }

    #[tokio::test]
    async fn send_without_handler_fails() {
        let engine = ScriptedEngine::answering("hello");
        let mut session = engine.create_session(&config()).await.unwrap();
        assert!(session.send("describe").await.is_err());
    }

    #[tokio::test]
    async fn configured_failures() {
        let engine = ScriptedEngine::answering("x").failing_at(FailAt::Start);
        assert!(engine.start().await.is_err());

        let engine = ScriptedEngine::answering("x").failing_at(FailAt::CreateSession);
        assert!(engine.create_session(&config()).await.is_err());

        let engine = ScriptedEngine::answering("x").failing_at(FailAt::Send);
        let mut session = engine.create_session(&config()).await.unwrap();
        session.on(Arc::new(|_: SessionEvent| {}));
        assert!(session.send("describe").await.is_err());
        assert_eq!(engine.journal(), ["create_session", "on", "send"]);
    }
}

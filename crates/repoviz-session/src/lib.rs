pub mod claude;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod scripted;
pub mod tracker;

pub use claude::ClaudeCodeEngine;
pub use engine::{AnalysisEngine, EngineSession, EventHandler, SessionConfig, SessionEvent};
pub use error::{AnalyzeError, SessionError};
pub use orchestrator::Orchestrator;
pub use pipeline::Analyzer;
pub use scripted::{FailAt, ScriptedEngine};
pub use tracker::{SessionPhase, SessionTracker};

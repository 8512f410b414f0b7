use serde::{Deserialize, Serialize};

use crate::repo::RepositoryRef;

/// Response text returned when the reference string cannot be parsed.
pub const INVALID_REFERENCE_MESSAGE: &str =
    "Invalid GitHub URL. Please use format: https://github.com/owner/repo";

/// Response text substituted when a session produced no final message.
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response received.";

// ── Request ──

/// Which instruction template is submitted to the analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    Overview,
    Structure,
    Dependencies,
    Diagram,
}

impl AnalysisKind {
    /// Parse a kind name; anything unrecognized falls back to `Overview`.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "structure" => Self::Structure,
            "dependencies" => Self::Dependencies,
            "diagram" => Self::Diagram,
            _ => Self::Overview,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Structure => "structure",
            Self::Dependencies => "dependencies",
            Self::Diagram => "diagram",
        }
    }
}

/// Where the engine reads the repository from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Clone a snapshot into a workspace and point the engine at it.
    #[default]
    Local,
    /// No clone; the engine fetches what it needs from the web.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub repository: RepositoryRef,
    pub kind: AnalysisKind,
    pub mode: AnalysisMode,
}

impl AnalysisRequest {
    pub fn new(repository: RepositoryRef, kind: AnalysisKind) -> Self {
        Self {
            repository,
            kind,
            mode: AnalysisMode::Local,
        }
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }
}

// ── Result ──

/// One entry of the ordered event log returned to the caller.
/// Serialized as tagged JSON (`"type": "tool_start"`, etc.).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    MessageDelta {
        content: String,
    },
    ToolStart {
        tool_name: String,
        tool_call_id: Option<String>,
    },
    ToolComplete {
        tool_call_id: String,
        result: Option<serde_json::Value>,
    },
    SessionIdle,
}

/// Final payload of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub response: String,
    pub events: Vec<EventRecord>,
    #[serde(flatten)]
    pub repository: Option<RepositoryRef>,
}

impl AnalysisResult {
    /// Join final-message fragments; an empty list yields the placeholder.
    pub fn from_fragments(
        fragments: &[String],
        events: Vec<EventRecord>,
        repository: RepositoryRef,
    ) -> Self {
        let response = if fragments.is_empty() {
            NO_RESPONSE_PLACEHOLDER.to_string()
        } else {
            fragments.join("\n")
        };
        Self {
            response,
            events,
            repository: Some(repository),
        }
    }

    /// Result for a reference string that could not be parsed.
    pub fn invalid_reference() -> Self {
        Self {
            response: INVALID_REFERENCE_MESSAGE.to_string(),
            events: Vec::new(),
            repository: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.response == NO_RESPONSE_PLACEHOLDER
    }
}

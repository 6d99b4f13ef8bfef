use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::{error::Result, message::Message};

pub const TAKE_NOTE_TOOL: &str = "take_note";

/// Structured signal attached to an assistant reply, separate from its prose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: BTreeMap<String, String>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn take_note(text: impl Into<String>) -> Self {
        Self::new(TAKE_NOTE_TOOL).with_argument("text", text)
    }

    /// The recorded note text, if this is a `take_note` call carrying non-empty text.
    /// Every other invocation is meaningless to the intake flow.
    pub fn note_text(&self) -> Option<&str> {
        if self.name != TAKE_NOTE_TOOL {
            return None;
        }
        self.arguments
            .get("text")
            .map(String::as_str)
            .filter(|text| !text.trim().is_empty())
    }
}

/// What the inference capability returned, decided by the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantResponse {
    Plain(String),
    WithTool(String, ToolInvocation),
}

impl AssistantResponse {
    pub fn content(&self) -> &str {
        match self {
            AssistantResponse::Plain(content) | AssistantResponse::WithTool(content, _) => content,
        }
    }

    pub fn tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            AssistantResponse::Plain(_) => None,
            AssistantResponse::WithTool(_, invocation) => Some(invocation),
        }
    }

    pub fn into_content(self) -> String {
        match self {
            AssistantResponse::Plain(content) | AssistantResponse::WithTool(content, _) => content,
        }
    }
}

/// Tool descriptor offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn take_note() -> Self {
        Self {
            name: TAKE_NOTE_TOOL.to_string(),
            description: "Record this symptom description in the patient's notes once enough \
                          medically relevant information has been gathered."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Summary of the patient's symptoms"
                    }
                },
                "required": ["text"]
            }),
        }
    }
}

/// Black-box text generation with optional tool calling.
///
/// Implementations map every provider error to
/// [`TriageError::InferenceFailure`](crate::TriageError::InferenceFailure).
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn invoke(&self, history: &[Message], tools: &[ToolSpec]) -> Result<AssistantResponse>;
}

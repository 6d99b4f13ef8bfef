//! Scripted inference double for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{
    error::{Result, TriageError},
    inference::{AssistantResponse, InferenceClient, ToolSpec},
    message::Message,
};

/// One recorded `invoke` call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history: Vec<Message>,
    /// Names of the tools offered
    pub tools: Vec<String>,
}

impl RecordedCall {
    /// Content of the last message sent, usually the prompt
    pub fn prompt(&self) -> &str {
        self.history
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Replays queued responses in order. Once the queue is empty every call
/// fails with `InferenceFailure`, unless a repeating response is set.
pub struct ScriptedInference {
    responses: Mutex<VecDeque<AssistantResponse>>,
    repeat: Option<AssistantResponse>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedInference {
    pub fn new(responses: Vec<AssistantResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(response: AssistantResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue of plain-text replies
    pub fn plain<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            replies
                .into_iter()
                .map(|reply| AssistantResponse::Plain(reply.into()))
                .collect(),
        )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn invoke(&self, history: &[Message], tools: &[ToolSpec]) -> Result<AssistantResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                history: history.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        next.or_else(|| self.repeat.clone()).ok_or_else(|| {
            TriageError::InferenceFailure("scripted inference has no response left".to_string())
        })
    }
}

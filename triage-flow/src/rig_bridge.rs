//! Bridge between the intake flow and rig-core completion models.
//!
//! Conversion rules:
//! * system messages become the request preamble,
//! * the final non-system message is the prompt, the rest is chat history,
//! * the provider's assistant content is decided exhaustively into
//!   [`AssistantResponse::Plain`] or [`AssistantResponse::WithTool`].

use async_trait::async_trait;
use rig::{
    client::CompletionClient,
    completion::{CompletionModel, CompletionRequestBuilder, Message as RigMessage, ToolDefinition},
    OneOrMany,
    message::AssistantContent,
    providers::openrouter,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    error::{Result, TriageError},
    inference::{AssistantResponse, InferenceClient, TAKE_NOTE_TOOL, ToolInvocation, ToolSpec},
    message::{Message, MessageRole},
};

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Chat turn in rig's representation; system messages travel as the preamble
fn to_rig_message(msg: &Message) -> Option<RigMessage> {
    match msg.role {
        MessageRole::User => Some(RigMessage::user(msg.content.clone())),
        MessageRole::Assistant => Some(RigMessage::assistant(msg.content.clone())),
        MessageRole::System => None,
    }
}

pub fn to_tool_definition(spec: &ToolSpec) -> ToolDefinition {
    ToolDefinition {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: spec.parameters.clone(),
    }
}

/// Inference capability backed by any rig completion model
#[derive(Clone)]
pub struct RigInference<M> {
    model: M,
}

impl<M> RigInference<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

impl RigInference<openrouter::CompletionModel> {
    pub fn openrouter(api_key: &str, model: &str) -> Self {
        let client = openrouter::Client::new(api_key);
        Self::new(client.completion_model(model))
    }
}

#[async_trait]
impl<M> InferenceClient for RigInference<M>
where
    M: CompletionModel + Clone + Send + Sync + 'static,
{
    async fn invoke(&self, history: &[Message], tools: &[ToolSpec]) -> Result<AssistantResponse> {
        let preamble = history
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut chat: Vec<RigMessage> = history.iter().filter_map(to_rig_message).collect();
        let prompt = chat.pop().ok_or_else(|| {
            TriageError::InferenceFailure("no prompt message in history".to_string())
        })?;

        let mut request = CompletionRequestBuilder::new(self.model.clone(), prompt)
            .messages(chat)
            .tools(tools.iter().map(to_tool_definition).collect());
        if !preamble.is_empty() {
            request = request.preamble(preamble);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TriageError::InferenceFailure(e.to_string()))?;

        Ok(classify_choice(response.choice))
    }
}

/// Fold the provider's content parts into a single response.
/// A `take_note` call wins over any other tool call.
pub fn classify_choice(choice: OneOrMany<AssistantContent>) -> AssistantResponse {
    let mut text_parts: Vec<String> = Vec::new();
    let mut invocations: Vec<ToolInvocation> = Vec::new();

    for content in choice.into_iter() {
        match content {
            AssistantContent::Text(text) => text_parts.push(text.text),
            AssistantContent::ToolCall(call) => invocations.push(ToolInvocation {
                name: call.function.name,
                arguments: arguments_to_map(call.function.arguments),
            }),
            _ => {}
        }
    }

    let text = text_parts.join("");
    let chosen = invocations
        .iter()
        .position(|inv| inv.name == TAKE_NOTE_TOOL)
        .or_else(|| (!invocations.is_empty()).then_some(0))
        .map(|index| invocations.swap_remove(index));

    match chosen {
        Some(invocation) => {
            debug!(tool = %invocation.name, "Assistant response carries a tool call");
            AssistantResponse::WithTool(text, invocation)
        }
        None => AssistantResponse::Plain(text),
    }
}

fn arguments_to_map(arguments: Value) -> BTreeMap<String, String> {
    let object = match arguments {
        Value::Object(map) => map,
        // some providers send the arguments object as an encoded string
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => return BTreeMap::new(),
        },
        _ => return BTreeMap::new(),
    };

    object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

//! IntakeRunner – handles one chat round-trip end to end.
//!
//! Clients carry the conversation history, so every request rebuilds the
//! [`ConversationState`], applies exactly **one** patient turn and, when that
//! turn completes the intake, runs triage and persists the assessment:
//!
//! ```text
//! resume → advance → (finished with notes?) → triage → extract ESI → persist
//! ```
//!
//! Persisting is best effort. A store failure is logged and the patient still
//! receives the completed assessment.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    conversation::{ConversationController, ConversationState, FinishReason},
    error::{Result, TriageError},
    esi::{DEFAULT_ESI_LEVEL, EsiExtractor, EsiSource},
    message::{Message, MessageLog, MessageRole},
    storage::{AssessmentStore, NewAssessment},
    workflow::TriageWorkflow,
};

pub const GOODBYE_MESSAGE: &str =
    "Thank you for visiting. If your symptoms get worse, please seek care right away.";

pub const TURN_LIMIT_MESSAGE: &str = "We have reached the end of this intake session without \
    a complete symptom summary. Please speak with a member of staff at the front desk.";

/// One entry of the client-held history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub patient_name: String,
    pub patient_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub finished: bool,
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub esi_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<Uuid>,
}

impl ChatReply {
    fn open(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            finished: false,
            notes: Vec::new(),
            finish_reason: None,
            esi_level: None,
            diagnosis: None,
            assessment_id: None,
        }
    }
}

/// High-level helper composing the intake conversation, triage and storage
#[derive(Clone)]
pub struct IntakeRunner {
    controller: ConversationController,
    workflow: TriageWorkflow,
    extractor: EsiExtractor,
    store: Arc<dyn AssessmentStore>,
}

impl IntakeRunner {
    pub fn new(
        controller: ConversationController,
        workflow: TriageWorkflow,
        store: Arc<dyn AssessmentStore>,
    ) -> Self {
        Self {
            controller,
            workflow,
            extractor: EsiExtractor::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn AssessmentStore> {
        &self.store
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply> {
        validate_identity(&request)?;

        let messages = self
            .controller
            .screen(resumable_history(&request.history, &request.message));

        if messages.is_empty() && request.message.trim().is_empty() {
            let state = self.controller.start();
            info!("Starting new intake conversation");
            return Ok(ChatReply::open(state.last_reply().unwrap_or_default()));
        }

        let state = ConversationState::resume(messages);
        let state = self.controller.advance(state, &request.message).await?;

        if !state.is_finished() {
            return Ok(ChatReply::open(state.last_reply().unwrap_or_default()));
        }

        match state.finish_reason() {
            Some(FinishReason::NoteTaken) => self.complete(state, &request).await,
            Some(FinishReason::TurnLimit) => Ok(closed_reply(&state, TURN_LIMIT_MESSAGE)),
            _ => Ok(closed_reply(&state, GOODBYE_MESSAGE)),
        }
    }

    async fn complete(&self, state: ConversationState, request: &ChatRequest) -> Result<ChatReply> {
        let note = state.note_text();
        let outcome = self.workflow.run(&note).await?;

        let extraction = self.extractor.extract_detailed(&outcome.esi_text);
        let level = if extraction.in_range() {
            extraction.level
        } else {
            warn!(
                extracted = extraction.level,
                default_level = DEFAULT_ESI_LEVEL,
                "Extracted ESI level outside 1-5, using default"
            );
            DEFAULT_ESI_LEVEL
        };
        let esi_level = level as i32;

        info!(
            esi_level,
            defaulted = extraction.source == EsiSource::Defaulted,
            iterations = outcome.iterations,
            "Triage assessment ready"
        );

        let assessment = NewAssessment {
            notes: note,
            esi_level,
            diagnosis: outcome.diagnosis.clone(),
            patient_name: request.patient_name.clone(),
            patient_email: request.patient_email.clone(),
        };
        let assessment_id = match self.store.insert_assessment(assessment).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(error = %e, "Failed to persist assessment, reporting result anyway");
                None
            }
        };

        Ok(ChatReply {
            response: completion_message(esi_level, &outcome.diagnosis),
            finished: true,
            notes: state.notes().to_vec(),
            finish_reason: state.finish_reason(),
            esi_level: Some(esi_level),
            diagnosis: Some(outcome.diagnosis),
            assessment_id,
        })
    }
}

fn validate_identity(request: &ChatRequest) -> Result<()> {
    if request.patient_name.trim().is_empty() || request.patient_email.trim().is_empty() {
        return Err(TriageError::InvalidRequest(
            "patient_name and patient_email are required".to_string(),
        ));
    }
    Ok(())
}

/// Client history minus system entries and minus a trailing copy of the
/// message being sent
fn resumable_history(history: &[HistoryEntry], message: &str) -> MessageLog {
    let mut entries: Vec<&HistoryEntry> = history
        .iter()
        .filter(|entry| entry.role != MessageRole::System)
        .collect();

    if entries
        .last()
        .is_some_and(|last| last.role == MessageRole::User && last.content == message)
    {
        entries.pop();
    }

    MessageLog::from_messages(
        entries
            .into_iter()
            .map(|entry| Message::new(entry.role, entry.content.clone())),
    )
}

fn closed_reply(state: &ConversationState, message: &str) -> ChatReply {
    ChatReply {
        response: message.to_string(),
        finished: true,
        notes: state.notes().to_vec(),
        finish_reason: state.finish_reason(),
        ..ChatReply::open("")
    }
}

fn completion_message(esi_level: i32, diagnosis: &str) -> String {
    format!(
        "Thank you, your intake is complete and has been shared with our staff.\n\n\
         **ESI Level:** {esi_level}\n\n\
         **Preliminary assessment:**\n{diagnosis}"
    )
}

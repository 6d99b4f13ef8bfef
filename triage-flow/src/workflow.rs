use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::{
    error::{Result, TriageError},
    inference::InferenceClient,
    message::Message,
};

/// Number of Doctor passes before the workflow stops
pub const MAX_ITERATIONS: u32 = 2;

/// Workflow position. Legal moves: Nurse → Doctor, Doctor → Nurse | Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriageStep {
    Nurse,
    Doctor,
    Done,
}

/// Snapshot of the refinement loop between two steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageState {
    pub note: String,
    pub nurse_msg: Option<String>,
    pub doctor_msg: Option<String>,
    pub iteration: u32,
    pub step: TriageStep,
}

impl TriageState {
    pub fn new(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            nurse_msg: None,
            doctor_msg: None,
            iteration: 0,
            step: TriageStep::Nurse,
        }
    }

    /// Record the reply of the role whose turn it is and move to the next step.
    /// A finished state is returned unchanged.
    pub fn apply(self, reply: String) -> Self {
        match self.step {
            TriageStep::Nurse => Self {
                nurse_msg: Some(reply),
                step: TriageStep::Doctor,
                ..self
            },
            TriageStep::Doctor => {
                let iteration = self.iteration + 1;
                let step = if iteration < MAX_ITERATIONS {
                    TriageStep::Nurse
                } else {
                    TriageStep::Done
                };
                Self {
                    doctor_msg: Some(reply),
                    iteration,
                    step,
                    ..self
                }
            }
            TriageStep::Done => self,
        }
    }

    /// Prompt for the role whose turn it is, `None` once done
    pub fn prompt(&self) -> Option<String> {
        match self.step {
            TriageStep::Nurse => Some(nurse_prompt(
                &self.note,
                self.doctor_msg.as_deref().unwrap_or_default(),
            )),
            TriageStep::Doctor => Some(doctor_prompt(
                &self.note,
                self.nurse_msg.as_deref().unwrap_or_default(),
            )),
            TriageStep::Done => None,
        }
    }
}

fn nurse_prompt(note: &str, doctor_msg: &str) -> String {
    format!(
        "Role: Emergency Department Triage Nurse
Instructions: Assign an Emergency Severity Index (ESI) level from 1 (most urgent) to 5 (least urgent) and explain your reasoning. State the level as \"ESI <number>\". If the doctor has commented, reconsider the level in light of those comments.

Patient Note: {note}
Previous Doctor Input: {doctor_msg}

Your Response:"
    )
}

fn doctor_prompt(note: &str, nurse_msg: &str) -> String {
    format!(
        "Role: Emergency Department Physician
Instructions: List the possible diagnoses for this patient, most likely first, and comment on whether the nurse's triage priority is appropriate.

Patient Note: {note}
Nurse's Assessment: {nurse_msg}

Your Response:"
    )
}

/// Final output of a completed refinement loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageOutcome {
    /// Last nurse reply, the source of the ESI level
    pub esi_text: String,
    /// Last doctor reply
    pub diagnosis: String,
    pub iterations: u32,
}

/// Bounded Nurse/Doctor refinement over a symptom note
#[derive(Clone)]
pub struct TriageWorkflow {
    inference: Arc<dyn InferenceClient>,
}

impl TriageWorkflow {
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    /// Run to completion: exactly `2 * MAX_ITERATIONS` inference calls.
    /// Any failure aborts the run with no partial result.
    pub async fn run(&self, note: &str) -> Result<TriageOutcome> {
        let mut state = TriageState::new(note);

        while let Some(prompt) = state.prompt() {
            info!(
                role = ?state.step,
                iteration = state.iteration,
                "Running triage step"
            );
            let response = self.inference.invoke(&[Message::user(prompt)], &[]).await?;
            state = state.apply(response.into_content());
        }

        info!(iterations = state.iteration, "Triage workflow completed");

        match (state.nurse_msg, state.doctor_msg) {
            (Some(esi_text), Some(diagnosis)) => Ok(TriageOutcome {
                esi_text,
                diagnosis,
                iterations: state.iteration,
            }),
            _ => Err(TriageError::Other(anyhow::anyhow!(
                "triage workflow ended without nurse and doctor replies"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedInference;

    #[test]
    fn test_transitions_follow_closed_set() {
        let state = TriageState::new("fever");
        assert_eq!(state.step, TriageStep::Nurse);

        let state = state.apply("ESI 3".into());
        assert_eq!(state.step, TriageStep::Doctor);
        assert_eq!(state.iteration, 0);

        let state = state.apply("flu".into());
        assert_eq!(state.step, TriageStep::Nurse);
        assert_eq!(state.iteration, 1);

        let state = state.apply("ESI 4".into()).apply("viral infection".into());
        assert_eq!(state.step, TriageStep::Done);
        assert_eq!(state.iteration, 2);
        assert_eq!(state.prompt(), None);

        let unchanged = state.clone().apply("ignored".into());
        assert_eq!(unchanged, state);
    }

    #[test]
    fn test_first_nurse_prompt_has_empty_doctor_input() {
        let prompt = TriageState::new("rash on arm").prompt().unwrap();
        assert!(prompt.contains("Patient Note: rash on arm"));
        assert!(prompt.contains("Previous Doctor Input: \n"));
    }

    #[tokio::test]
    async fn test_run_makes_four_calls_and_feeds_roles() {
        let inference = Arc::new(ScriptedInference::plain([
            "nurse one: ESI 3",
            "doctor one: angina?",
            "nurse two: ESI 2",
            "doctor two: acute coronary syndrome",
        ]));
        let workflow = TriageWorkflow::new(inference.clone());

        let outcome = workflow.run("chest pain").await.unwrap();

        assert_eq!(outcome.iterations, MAX_ITERATIONS);
        assert_eq!(outcome.esi_text, "nurse two: ESI 2");
        assert_eq!(outcome.diagnosis, "doctor two: acute coronary syndrome");

        let calls = inference.calls();
        assert_eq!(calls.len(), 2 * MAX_ITERATIONS as usize);
        assert!(calls.iter().all(|c| c.tools.is_empty()));
        assert!(calls[0].prompt().contains("Triage Nurse"));
        assert!(calls[1].prompt().contains("Nurse's Assessment: nurse one: ESI 3"));
        assert!(calls[2].prompt().contains("Previous Doctor Input: doctor one: angina?"));
        assert!(calls[3].prompt().contains("Nurse's Assessment: nurse two: ESI 2"));
    }

    #[tokio::test]
    async fn test_failure_aborts_run() {
        let inference = Arc::new(ScriptedInference::plain(["ESI 2", "sepsis"]));
        let workflow = TriageWorkflow::new(inference.clone());

        let err = workflow.run("fever and confusion").await.unwrap_err();
        assert!(matches!(err, TriageError::InferenceFailure(_)));
        assert_eq!(inference.call_count(), 3);
    }
}

use std::sync::Arc;
use tracing::{error, info};
use triage_flow::{
    AssessmentStore, ControllerConfig, ConversationController, InMemoryAssessmentStore,
    InferenceClient, IntakeRunner, PostgresAssessmentStore, RigInference, TriageWorkflow,
};

use crate::config::ServiceConfig;

/// Wire one inference handle into both the intake conversation and triage
pub fn build_intake_runner(
    inference: Arc<dyn InferenceClient>,
    store: Arc<dyn AssessmentStore>,
    config: ControllerConfig,
) -> IntakeRunner {
    let controller = ConversationController::with_config(inference.clone(), config);
    let workflow = TriageWorkflow::new(inference);
    IntakeRunner::new(controller, workflow, store)
}

pub fn create_inference(config: &ServiceConfig) -> Arc<dyn InferenceClient> {
    info!(model = %config.model, "Using OpenRouter inference");
    Arc::new(RigInference::openrouter(&config.api_key, &config.model))
}

/// PostgreSQL when `DATABASE_URL` is set and reachable, otherwise in-memory
pub async fn create_assessment_store(database_url: Option<&str>) -> Arc<dyn AssessmentStore> {
    let Some(database_url) = database_url else {
        info!("Using in-memory assessment storage (set DATABASE_URL to use PostgreSQL)");
        return Arc::new(InMemoryAssessmentStore::new());
    };

    info!("Using PostgreSQL assessment storage");
    match PostgresAssessmentStore::connect(database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(
                "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                e
            );
            Arc::new(InMemoryAssessmentStore::new())
        }
    }
}

pub mod conversation;
pub mod error;
pub mod esi;
pub mod guard;
pub mod inference;
pub mod message;
pub mod runner;
pub mod storage;
pub mod storage_postgres;
pub mod workflow;

#[cfg(feature = "rig")]
pub mod rig_bridge;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use conversation::{
    ControllerConfig, ConversationController, ConversationState, FinishReason, GuardMode,
};
pub use error::{Result, TriageError};
pub use esi::{DEFAULT_ESI_LEVEL, EsiExtraction, EsiExtractor, EsiSource};
pub use guard::InjectionGuard;
pub use inference::{AssistantResponse, InferenceClient, ToolInvocation, ToolSpec};
pub use message::{Message, MessageLog, MessageRole};
pub use runner::{ChatReply, ChatRequest, HistoryEntry, IntakeRunner};
pub use storage::{Assessment, AssessmentStore, InMemoryAssessmentStore, NewAssessment};
pub use storage_postgres::PostgresAssessmentStore;
pub use workflow::{MAX_ITERATIONS, TriageOutcome, TriageState, TriageStep, TriageWorkflow};

#[cfg(feature = "rig")]
pub use rig_bridge::RigInference;

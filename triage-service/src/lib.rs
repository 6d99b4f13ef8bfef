pub mod config;
pub mod service;
pub mod workflow;

pub use config::{ConfigError, ServiceConfig};
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_intake_runner, create_assessment_store, create_inference};

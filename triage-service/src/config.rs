use thiserror::Error;
use tracing::warn;
use triage_flow::{
    ControllerConfig, GuardMode, conversation::DEFAULT_MAX_TURNS, rig_bridge::DEFAULT_MODEL,
};

const DEFAULT_PORT: u16 = 3000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

/// Service settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub api_key: String,
    pub model: String,
    pub database_url: Option<String>,
    pub port: u16,
    pub max_turns: usize,
    pub guard_mode: GuardMode,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable optional values fall back to
    /// their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let model = lookup("TRIAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let port = parse_or("PORT", lookup("PORT"), DEFAULT_PORT);
        let max_turns = parse_or("TRIAGE_MAX_TURNS", lookup("TRIAGE_MAX_TURNS"), DEFAULT_MAX_TURNS)
            .max(1);
        let guard_mode = parse_or(
            "TRIAGE_INPUT_GUARD",
            lookup("TRIAGE_INPUT_GUARD"),
            GuardMode::default(),
        );

        Ok(Self {
            api_key,
            model,
            database_url,
            port,
            max_turns,
            guard_mode,
        })
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            max_turns: self.max_turns,
            guard_mode: self.guard_mode,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
    }
}

//! Shared application state injected into every handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pi_core::settings::Settings;
use pi_core::{GeneratorFacade, ToolExecutor};

use crate::config::Config;
use crate::controller::ServerStatus;

/// The single model id advertised on the OpenAI surface.
pub const MODEL_ID: &str = "apple.local";

/// The same model as the Ollama inventory names it.
pub const OLLAMA_MODEL_NAME: &str = "apple.local:latest";

/// State shared across all connection tasks.
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Settings,
    pub facade: GeneratorFacade,
    pub executor: Arc<dyn ToolExecutor>,
    /// Captured once at process start; also the model inventory's `created`
    /// timestamp.
    pub started_at: DateTime<Utc>,
    pub status: Arc<ServerStatus>,
}

impl AppState {
    /// Unix-second `created` value for the model inventory entry.
    pub fn model_created(&self) -> i64 {
        self.started_at.timestamp()
    }
}

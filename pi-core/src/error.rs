use thiserror::Error;

/// Errors produced by the engine layer.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The on-device model's availability probe reported not-ready.
    #[error("generator unavailable: {reason}")]
    GeneratorUnavailable { reason: String },

    /// The backend accepted the request but failed mid-generation.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// A tool-call envelope referenced a tool nobody registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

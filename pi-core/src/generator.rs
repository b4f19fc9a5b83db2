//! Generator trait and availability-gated façade.
//!
//! The on-device model is opaque to the gateway: one call produces one bounded
//! text reply, and a probe reports whether the model is usable at all.  The
//! façade wraps the probe so callers that must always produce *something* for
//! the client (HTTP 200 with a readable body, never a 5xx for a missing
//! model) can substitute the local-fallback string.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::CoreError;

/// Baseline steering passed to the backend when the caller has nothing more
/// specific to say.
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful local assistant. Answer directly and concisely.";

/// Result of the model's availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready,
    Unavailable { reason: String },
}

/// The opaque on-device text-generation backend.
///
/// `instructions` carries the per-call system steering; `prompt` is the fully
/// budgeted conversation text.  Each call is a fresh bounded session; the
/// backend keeps no state between calls.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn availability(&self) -> Availability;

    async fn generate(&self, instructions: &str, prompt: &str) -> Result<String, CoreError>;
}

/// Availability-gated wrapper around a [`Generator`].
#[derive(Clone)]
pub struct GeneratorFacade {
    inner: Arc<dyn Generator>,
}

impl GeneratorFacade {
    pub fn new(inner: Arc<dyn Generator>) -> Self {
        Self { inner }
    }

    /// The string served to clients when the model cannot run.
    pub fn fallback_message(reason: &str) -> String {
        format!("(Local fallback) Apple Intelligence unavailable: {reason}")
    }

    pub async fn is_ready(&self) -> bool {
        matches!(self.inner.availability().await, Availability::Ready)
    }

    /// Generate, failing with [`CoreError::GeneratorUnavailable`] when the
    /// probe reports not-ready.
    pub async fn generate(&self, instructions: &str, prompt: &str) -> Result<String, CoreError> {
        match self.inner.availability().await {
            Availability::Ready => self.inner.generate(instructions, prompt).await,
            Availability::Unavailable { reason } => {
                Err(CoreError::GeneratorUnavailable { reason })
            }
        }
    }

    /// Generate, substituting the local-fallback string on any failure.
    ///
    /// Used on paths that have already committed an HTTP 200 to the client
    /// (final answers, stream segments), where an error body would be worse
    /// than a readable apology.
    pub async fn generate_or_fallback(&self, instructions: &str, prompt: &str) -> String {
        match self.generate(instructions, prompt).await {
            Ok(text) => text,
            Err(CoreError::GeneratorUnavailable { reason }) => {
                warn!(reason = %reason, "generator unavailable; serving fallback");
                Self::fallback_message(&reason)
            }
            Err(e) => {
                warn!(error = %e, "generation failed; serving fallback");
                Self::fallback_message(&e.to_string())
            }
        }
    }
}

/// Placeholder backend for builds where no platform bridge is registered.
/// The probe always fails, so every request is served the fallback string.
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Generator for UnavailableGenerator {
    async fn availability(&self) -> Availability {
        Availability::Unavailable {
            reason: self.reason.clone(),
        }
    }

    async fn generate(&self, _instructions: &str, _prompt: &str) -> Result<String, CoreError> {
        Err(CoreError::GeneratorUnavailable {
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[tokio::test]
    async fn facade_passes_through_when_ready() {
        let facade = GeneratorFacade::new(Arc::new(ScriptedGenerator::replies(["pong"])));
        let out = facade
            .generate("", "ping")
            .await
            .expect("ready generator should reply");
        assert_eq!(out, "pong");
    }

    #[tokio::test]
    async fn facade_gates_on_availability() {
        let gen = ScriptedGenerator::replies(["never"]);
        gen.set_unavailable("model assets not downloaded");
        let facade = GeneratorFacade::new(Arc::new(gen));

        let err = facade.generate("", "ping").await.unwrap_err();
        assert!(matches!(err, CoreError::GeneratorUnavailable { .. }));
    }

    #[tokio::test]
    async fn fallback_text_names_the_cause() {
        let gen = ScriptedGenerator::replies(["never"]);
        gen.set_unavailable("not ready");
        let facade = GeneratorFacade::new(Arc::new(gen));

        let out = facade.generate_or_fallback("", "ping").await;
        assert!(out.starts_with("(Local fallback) Apple Intelligence unavailable:"));
        assert!(out.contains("not ready"));
    }
}

//! Multi-segment streaming.
//!
//! Long-form streamed answers are produced by chaining bounded generator
//! sessions: each round contributes one segment, emitted as a single SSE
//! delta.  The chain stops when a round comes back short (the model ran out
//! of things to say) or at the round cap.  The backend holds no state
//! between rounds, so each round's instructions carry the tail of the text
//! produced so far.

use tracing::{debug, warn};

use pi_core::GeneratorFacade;

use crate::http::stream::Emitter;
use crate::schemas::openai::{chat_chunk, chat_terminal, DONE_SENTINEL};

/// Target characters per segment.
pub const SEGMENT_CHARS: usize = 1400;

/// Upper bound on chained rounds.
pub const MAX_SEGMENTS: usize = 6;

/// How much of the accumulated answer is replayed to later rounds.
const TAIL_CONTEXT_CHARS: usize = 1500;

/// Run the segment chain and finish the SSE protocol (terminal delta and
/// `[DONE]`), even when a round fails.
pub async fn stream_segments(
    facade: &GeneratorFacade,
    base_prompt: &str,
    emitter: &Emitter,
    id: &str,
    created: i64,
    model: &str,
) {
    let mut total = String::new();

    for round in 1..=MAX_SEGMENTS {
        let prompt = if round == 1 {
            base_prompt.to_owned()
        } else {
            format!("{base_prompt}\n\nassistant:")
        };

        match facade.generate(&round_instructions(round, &total), &prompt).await {
            Ok(segment) => {
                if emitter
                    .sse_json(&chat_chunk(id, created, model, &segment))
                    .await
                    .is_err()
                {
                    // Peer went away; nothing more to write.
                    return;
                }
                total.push_str(&segment);

                // A short round means the answer is complete.
                let threshold = SEGMENT_CHARS * (round - 1) + SEGMENT_CHARS * 6 / 10;
                if total.chars().count() < threshold {
                    debug!(round, total_chars = total.chars().count(), "segment chain complete");
                    break;
                }
            }
            Err(e) => {
                warn!(round, error = %e, "segment generation failed; emitting fallback");
                let fallback = GeneratorFacade::fallback_message(&e.to_string());
                if emitter
                    .sse_json(&chat_chunk(id, created, model, &fallback))
                    .await
                    .is_err()
                {
                    return;
                }
                break;
            }
        }
    }

    let _ = emitter.sse_json(&chat_terminal(id, created, model)).await;
    let _ = emitter.sse_raw(DONE_SENTINEL).await;
}

fn round_instructions(round: usize, total: &str) -> String {
    let mut instructions = format!(
        "Continue the answer succinctly. Aim for roughly {SEGMENT_CHARS} characters in this \
         segment and do not repeat earlier text."
    );
    if round > 1 {
        let chars = total.chars().count();
        let tail: String = total
            .chars()
            .skip(chars.saturating_sub(TAIL_CONTEXT_CHARS))
            .collect();
        instructions.push_str("\nThe answer so far ends with:\n");
        instructions.push_str(&tail);
    }
    instructions
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use futures::FutureExt;

    use super::*;
    use crate::http::stream::run_stream;
    use crate::http::StreamDriver;
    use pi_core::testing::ScriptedGenerator;

    /// Run the segment chain into a byte buffer and return the SSE payloads.
    async fn collect_events(gen: Arc<ScriptedGenerator>) -> Vec<String> {
        let facade = GeneratorFacade::new(gen);
        let driver: StreamDriver = Box::new(move |emitter| {
            async move {
                stream_segments(&facade, "user: go\nassistant:", &emitter, "chatcmpl-t", 0, "apple.local")
                    .await;
            }
            .boxed()
        });

        let mut out = Vec::new();
        run_stream(&mut out, driver).await.expect("stream should run");
        let text = String::from_utf8(out).expect("stream output should be UTF-8");
        text.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(str::to_owned)
            .collect()
    }

    #[tokio::test]
    async fn short_first_round_ends_after_one_segment() {
        let events = collect_events(Arc::new(ScriptedGenerator::replies(["done quickly"]))).await;
        // One content delta, one terminal, one [DONE].
        assert_eq!(events.len(), 3);
        assert!(events[0].contains("done quickly"));
        assert!(events[1].contains("\"finish_reason\":\"stop\""));
        assert_eq!(events[2], "[DONE]");
    }

    #[tokio::test]
    async fn long_rounds_chain_until_a_short_one() {
        let long = "x".repeat(SEGMENT_CHARS);
        let events = collect_events(Arc::new(ScriptedGenerator::replies([
            long.clone(),
            long.clone(),
            "and that is all".to_owned(),
        ])))
        .await;
        // Three content deltas + terminal + [DONE].
        assert_eq!(events.len(), 5);
        assert!(events[2].contains("and that is all"));
        assert_eq!(events.last().unwrap(), "[DONE]");
    }

    #[tokio::test]
    async fn round_cap_bounds_the_chain() {
        let long = "y".repeat(SEGMENT_CHARS * 2);
        let replies: Vec<String> = (0..10).map(|_| long.clone()).collect();
        let events = collect_events(Arc::new(ScriptedGenerator::replies(replies))).await;
        // MAX_SEGMENTS deltas + terminal + [DONE].
        assert_eq!(events.len(), MAX_SEGMENTS + 2);
    }

    #[tokio::test]
    async fn generator_failure_emits_fallback_then_clean_termination() {
        let gen = ScriptedGenerator::replies(["unused"]);
        gen.set_unavailable("assets missing");
        let events = collect_events(Arc::new(gen)).await;
        assert_eq!(events.len(), 3);
        assert!(events[0].contains("(Local fallback) Apple Intelligence unavailable:"));
        assert!(events[1].contains("\"finish_reason\":\"stop\""));
        assert_eq!(events[2], "[DONE]");
    }

    #[test]
    fn later_rounds_replay_the_tail_of_the_answer() {
        let total = "a".repeat(3000);
        let instructions = round_instructions(2, &total);
        assert!(instructions.contains("The answer so far ends with:"));
        // Only the tail is replayed, not the whole accumulated answer.
        assert!(instructions.len() < 2000);
        assert!(round_instructions(1, "").len() < 200);
    }
}

//! Context budgeter.
//!
//! The on-device model accepts a fixed input window.  This module turns an
//! arbitrarily long chat history into a single prompt string that fits: short
//! histories pass through verbatim, long ones keep the most recent turns and
//! compress everything older through a summarization pass (with a naïve
//! sentence-extract fallback when the model itself is unavailable).

use tracing::{debug, warn};

use crate::chat::{ChatMessage, Role};
use crate::generator::GeneratorFacade;

/// Input-token ceiling of the on-device model.
pub const MAX_CONTEXT_TOKENS: usize = 4000;

/// Tokens held back for the model's own output.
pub const RESERVE_FOR_OUTPUT: usize = 512;

/// Recent messages always kept verbatim when compressing.
const KEEP_RECENT: usize = 6;

/// Older history is clamped to this many characters before summarization.
const OLDER_CLAMP_CHARS: usize = 6000;

/// Character ceiling for the first summarization pass.
const SUMMARY_LIMIT: usize = 1500;

/// Character ceiling for the second (re-summarization) pass.
const RESUMMARY_LIMIT: usize = 800;

/// Effective input budget in estimated tokens.
pub fn input_budget() -> usize {
    (MAX_CONTEXT_TOKENS - RESERVE_FOR_OUTPUT).max(1000)
}

/// Heuristic token estimate: ⌈chars / 4⌉.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Serialize messages as `role: content` lines.
pub fn format_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`format_messages`] plus the trailing `assistant:` line that cues the
/// model to produce the next turn.
pub fn format_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = format_messages(messages);
    if !prompt.is_empty() {
        prompt.push('\n');
    }
    prompt.push_str("assistant:");
    prompt
}

/// Produce a prompt whose estimated tokens fit [`input_budget`].
///
/// Keeps the last [`KEEP_RECENT`] messages verbatim; older turns are clamped
/// and summarized through the generator, at most twice.  The result of the
/// second pass is returned even in the unlikely case it still overshoots.
pub async fn budgeted_prompt(facade: &GeneratorFacade, messages: &[ChatMessage]) -> String {
    let full = format_prompt(messages);
    let budget = input_budget();
    if estimate_tokens(&full) <= budget {
        return full;
    }

    let keep = KEEP_RECENT.min(messages.len());
    let (older, recent) = messages.split_at(messages.len() - keep);
    let latest_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");

    let older_text = clamp_middle(&format_messages(older), OLDER_CLAMP_CHARS);

    debug!(
        pass = 1,
        older_chars = older_text.chars().count(),
        "compressing chat history to fit the input budget"
    );
    let mut summary = summarize(facade, &older_text, latest_user, SUMMARY_LIMIT).await;
    let mut prompt = compose(&summary, recent);

    if estimate_tokens(&prompt) > budget {
        debug!(pass = 2, "summary still over budget; re-summarizing");
        summary = summarize(facade, &summary, latest_user, RESUMMARY_LIMIT).await;
        prompt = compose(&summary, recent);
    }

    prompt
}

fn compose(summary: &str, recent: &[ChatMessage]) -> String {
    format!(
        "system: Conversation summary (compressed): \n{summary}\n{}",
        format_prompt(recent)
    )
}

async fn summarize(
    facade: &GeneratorFacade,
    text: &str,
    latest_user: &str,
    limit: usize,
) -> String {
    let instructions = format!(
        "Summarize the conversation excerpt you are given in at most {limit} characters. \
         Preserve technical detail relevant to the latest user request: {}",
        clamp_chars(latest_user, 280)
    );
    match facade.generate(&instructions, text).await {
        Ok(s) => clamp_chars(&s, limit),
        Err(e) => {
            warn!(error = %e, "summarization pass failed; using sentence extract");
            naive_extract(text, limit)
        }
    }
}

/// Truncate to at most `limit` characters, respecting char boundaries.
fn clamp_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    text.chars().take(limit).collect()
}

/// Head+tail clamp: keep the first and last halves, joined by an ellipsis
/// line, when `text` exceeds `limit` characters.
fn clamp_middle(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_owned();
    }
    let half = limit / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(count - half).collect();
    format!("{head}\n…\n{tail}")
}

/// Summarizer-free compression: first 8 sentences, an ellipsis, and the last
/// 4 sentences, clamped to `limit`.
fn naive_extract(text: &str, limit: usize) -> String {
    let sentences = split_sentences(text);
    let extracted = if sentences.len() <= 12 {
        text.to_owned()
    } else {
        let head = sentences[..8].concat();
        let tail = sentences[sentences.len() - 4..].concat();
        format!("{}… {}", head.trim_end(), tail.trim_start())
    };
    clamp_chars(&extracted, limit)
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            // Cut after the terminator and any immediately following space.
            let mut end = i + c.len_utf8();
            if let Some(&(_, next)) = iter.peek() {
                if next == ' ' || next == '\n' {
                    end += next.len_utf8();
                    iter.next();
                }
            }
            out.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

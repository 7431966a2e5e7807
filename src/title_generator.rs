//! Session title generation
//!
//! Asks the completion service for a short, meaningful title based on the
//! first user message. The truncated title stays in place if this fails.

use crate::llm::{LlmMessage, LlmRequest};
use crate::runtime::CompletionClient;
use std::time::Duration;
use tokio::time::timeout;

const TITLE_PROMPT: &str = r#"Generate a very short (3-6 words) title for a tutoring session that starts with the student message below. Output only the title, no quotes or trailing punctuation. Examples:
- "Can you explain how photosynthesis works?" -> How Photosynthesis Works
- "I need help with my essay on the French Revolution" -> French Revolution Essay Help
- "What's the difference between mitosis and meiosis" -> Mitosis Versus Meiosis

Student message:"#;

const TITLE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PROMPT_CHARS: usize = 500;
const MAX_TITLE_CHARS: usize = 60;

/// Generate a title for a session from its first message.
///
/// Returns None on timeout, service error or an empty reply.
pub async fn generate_title<C>(message_text: &str, client: &C) -> Option<String>
where
    C: CompletionClient + ?Sized,
{
    let truncated: String = if message_text.chars().count() > MAX_PROMPT_CHARS {
        let head: String = message_text.chars().take(MAX_PROMPT_CHARS).collect();
        format!("{head}...")
    } else {
        message_text.to_string()
    };

    let request = LlmRequest {
        system: String::new(),
        messages: vec![LlmMessage::user(format!("{TITLE_PROMPT}\n{truncated}"))],
        max_tokens: Some(50),
    };

    match timeout(TITLE_TIMEOUT, client.complete(&request)).await {
        Ok(Ok(response)) => {
            let title = sanitize_title(&response.text);
            if title.is_empty() {
                None
            } else {
                Some(title)
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e.message, kind = ?e.kind, "Title generation failed");
            None
        }
        Err(_) => {
            tracing::warn!("Title generation timed out");
            None
        }
    }
}

/// First line of the reply, unquoted, single-spaced and cut at a word boundary
fn sanitize_title(raw: &str) -> String {
    let first_line = raw.trim().lines().next().unwrap_or_default();
    let unquoted = first_line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*'))
        .trim_end_matches(|c| matches!(c, '.' | '!' | ':'));
    let spaced = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");

    if spaced.chars().count() <= MAX_TITLE_CHARS {
        return spaced;
    }

    let cut: String = spaced.chars().take(MAX_TITLE_CHARS).collect();
    match cut.rsplit_once(' ') {
        Some((head, _)) => head.to_string(),
        None => cut,
    }
}

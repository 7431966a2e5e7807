//! Locating the quiz record inside a free-form reply

use super::record::{QuizRecord, QuizType, QuizViolation, RawQuizReply};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid fence pattern"));

static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)```").expect("valid fence pattern"));

type Strategy = fn(&str) -> Option<&str>;

/// Extraction strategies, tried in order; the first candidate that decodes wins
const STRATEGIES: &[(&str, Strategy)] = &[
    ("whole_reply", whole_reply),
    ("json_fence", json_fence),
    ("any_fence", any_fence),
    ("first_object", first_object),
];

fn whole_reply(text: &str) -> Option<&str> {
    Some(text.trim())
}

fn fenced<'a>(pattern: &Regex, text: &'a str) -> Option<&'a str> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn json_fence(text: &str) -> Option<&str> {
    fenced(&JSON_FENCE, text)
}

fn any_fence(text: &str) -> Option<&str> {
    fenced(&ANY_FENCE, text)
}

/// First balanced top-level `{ ... }` span, ignoring braces inside strings
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let candidate = text.get(start..)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in candidate.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return candidate.get(..=offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// A candidate that is a JSON object with a `"type"` key, decoded.
/// `None` means the candidate is not a quiz object at all.
fn decode(candidate: &str) -> Option<Result<RawQuizReply, QuizViolation>> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;
    if !object.contains_key("type") {
        return None;
    }
    Some(RawQuizReply::deserialize(&value).map_err(|error| {
        let (field, detail) =
            mistyped_field(object).unwrap_or_else(|| ("?".to_string(), error.to_string()));
        QuizViolation::WrongFieldType { field, detail }
    }))
}

/// First field whose value does not fit the record's field type
fn mistyped_field(object: &Map<String, Value>) -> Option<(String, String)> {
    object.iter().find_map(|(key, value)| {
        let mut single = Map::new();
        single.insert("type".to_string(), Value::String(String::new()));
        single.insert(key.clone(), value.clone());
        serde_json::from_value::<RawQuizReply>(Value::Object(single))
            .err()
            .map(|error| (key.clone(), error.to_string()))
    })
}

/// Find the quiz object in a reply
pub fn extract_reply(text: &str) -> Result<RawQuizReply, QuizViolation> {
    let mut mistyped = None;
    for (name, strategy) in STRATEGIES {
        match strategy(text).and_then(decode) {
            Some(Ok(reply)) => {
                tracing::debug!(strategy = *name, kind = %reply.kind, "Decoded quiz reply");
                return Ok(reply);
            }
            Some(Err(violation)) => {
                tracing::debug!(strategy = *name, %violation, "Quiz object has a mistyped field");
                mistyped.get_or_insert(violation);
            }
            None => {}
        }
    }
    Err(mistyped.unwrap_or(QuizViolation::NoJson))
}

/// Extract and validate a quiz record from a complete reply
pub fn parse_record(text: &str, quiz_type: QuizType) -> Result<QuizRecord, QuizViolation> {
    extract_reply(text)?.validate(quiz_type)
}

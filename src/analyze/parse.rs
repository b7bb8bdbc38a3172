// src/analyze/parse.rs
//! Tolerant reader for classifier responses.
//!
//! The JSON array we asked for can arrive wrapped in several envelopes and
//! surrounded by prose or code fences. Anything we cannot read becomes an
//! empty result rather than an error.

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::BreakingItem;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// One entry per input item, in input order (as returned).
    pub results: Vec<Value>,
    /// Every entry of every result's `breaking` array, flattened.
    pub breaking: Vec<BreakingItem>,
}

static ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("static regex"));

pub fn parse_classifier_response(raw: &Value) -> ParsedResponse {
    match try_parse(raw) {
        Ok(p) => {
            tracing::debug!(
                target: "slow_path",
                results = p.results.len(),
                breaking = p.breaking.len(),
                "classifier response parsed"
            );
            p
        }
        Err(e) => {
            tracing::warn!(target: "slow_path", error = %e, "classifier response unreadable; treating as empty");
            ParsedResponse::default()
        }
    }
}

fn try_parse(raw: &Value) -> Result<ParsedResponse> {
    let results = match locate(raw) {
        Located::Text(content) => parse_content(content)?,
        Located::Array(arr) => arr.clone(),
        Located::Nothing => return Err(anyhow!("no content in response")),
    };

    let mut breaking = Vec::new();
    for r in &results {
        let Some(list) = r.get("breaking").and_then(Value::as_array) else {
            continue;
        };
        for b in list {
            match serde_json::from_value::<BreakingItem>(b.clone()) {
                Ok(item) => breaking.push(item),
                Err(e) => {
                    tracing::debug!(target: "slow_path", error = %e, "skipping non-object breaking entry")
                }
            }
        }
    }
    Ok(ParsedResponse { results, breaking })
}

enum Located<'a> {
    Text(&'a str),
    Array(&'a Vec<Value>),
    Nothing,
}

/// Content location, first match wins:
/// `[0].text`, `.text`, `.response.generations[0][0].text`,
/// `.choices[0].message.content` / `.choices[0].text`, `.content`,
/// a bare string, a bare array.
fn locate(raw: &Value) -> Located<'_> {
    if let Some(s) = non_empty(raw.get(0).and_then(|f| f.get("text"))) {
        return Located::Text(s);
    }
    if let Some(s) = non_empty(raw.get("text")) {
        return Located::Text(s);
    }
    if let Some(s) = non_empty(raw.pointer("/response/generations/0/0/text")) {
        return Located::Text(s);
    }
    if let Some(choice) = raw.pointer("/choices/0") {
        return match non_empty(choice.pointer("/message/content")).or(non_empty(choice.get("text"))) {
            Some(s) => Located::Text(s),
            None => Located::Nothing,
        };
    }
    if let Some(s) = non_empty(raw.get("content")) {
        return Located::Text(s);
    }
    match raw {
        Value::String(s) if !s.is_empty() => Located::Text(s),
        Value::Array(a) => Located::Array(a),
        _ => Located::Nothing,
    }
}

fn non_empty(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// The whole content as JSON, else the first `[...]` span; a lone object is
/// treated as a one-element list.
fn parse_content(content: &str) -> Result<Vec<Value>> {
    let parsed: Value = match serde_json::from_str(content.trim()) {
        Ok(v) => v,
        Err(whole) => match ARRAY_SPAN.find(content) {
            Some(m) => serde_json::from_str(m.as_str())?,
            None => return Err(whole.into()),
        },
    };
    match parsed {
        Value::Array(a) => Ok(a),
        other => Ok(vec![other]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BODY: &str = r#"[
      {"summary": "exchange halts", "breaking": [{"tweet_id": "1", "urgency": "high", "mainText": "halt"}]},
      {"summary": "meme", "breaking": []}
    ]"#;

    #[test]
    fn chat_completion_envelope() {
        let raw = json!({ "choices": [{ "message": { "content": BODY } }] });
        let p = parse_classifier_response(&raw);
        assert_eq!(p.results.len(), 2);
        assert_eq!(p.breaking.len(), 1);
        assert_eq!(p.breaking[0].tweet_id, "1");
        assert_eq!(p.breaking[0].main_text, "halt");
    }

    #[test]
    fn fenced_content_with_prose() {
        let content = format!("Here you go:\n```json\n{BODY}\n```\nDone.");
        let p = parse_classifier_response(&json!({ "content": content }));
        assert_eq!(p.results.len(), 2);
    }

    #[test]
    fn alternative_envelopes() {
        let generations = json!({ "response": { "generations": [[{ "text": BODY }]] } });
        assert_eq!(parse_classifier_response(&generations).breaking.len(), 1);

        let first_text = json!([{ "text": BODY }]);
        assert_eq!(parse_classifier_response(&first_text).results.len(), 2);

        let choice_text = json!({ "choices": [{ "text": BODY }] });
        assert_eq!(parse_classifier_response(&choice_text).results.len(), 2);

        let bare_string = Value::String(BODY.to_string());
        assert_eq!(parse_classifier_response(&bare_string).results.len(), 2);

        let bare_array: Value = serde_json::from_str(BODY).unwrap();
        assert_eq!(parse_classifier_response(&bare_array).breaking.len(), 1);
    }

    #[test]
    fn single_object_is_wrapped() {
        let raw = json!({ "text": r#"{"summary": "x", "breaking": [{"id": 7, "urgency": "medium"}]}"# });
        let p = parse_classifier_response(&raw);
        assert_eq!(p.results.len(), 1);
        assert_eq!(p.breaking[0].tweet_id, "7");
    }

    #[test]
    fn object_with_nested_array_is_not_mistaken_for_the_list() {
        let content = r#"{"summary": "halt", "breaking": [{"tweet_id": "9", "urgency": "high"}]}"#;
        let p = parse_classifier_response(&json!({ "choices": [{ "message": { "content": content } }] }));
        assert_eq!(p.results.len(), 1);
        assert_eq!(p.results[0]["summary"], "halt");
        assert_eq!(p.breaking.len(), 1);
        assert_eq!(p.breaking[0].urgency, "high");
    }

    #[test]
    fn garbage_degrades_to_empty() {
        for raw in [
            json!({ "choices": [{ "message": { "content": "I cannot help with that [sic" } }] }),
            json!({ "choices": [] }),
            json!(42),
            json!({ "text": "[not json]" }),
        ] {
            assert_eq!(parse_classifier_response(&raw), ParsedResponse::default());
        }
    }
}

//! Robust JSON extraction for language-model responses.
//!
//! Never parse a raw model response directly: bodies arrive as bare
//! objects, fenced blocks, or prose with an object buried inside, and
//! sometimes as truncated fragments. The helpers here normalise all of
//! those shapes and validate the intent schema before anything touches a
//! `ScriptIntent`. Every rejection returns `None`; the caller decides what
//! the next attempt looks like.

use tracing::{debug, warn};

use lumen_models::{ScriptIntent, SegmentIntent};

/// Responses shorter than this that still contain a fence marker are
/// truncated fragments (e.g. a lone ```` ```json ````), not recoverable
/// JSON.
const MIN_PLAUSIBLE_LENGTH: usize = 20;

/// Remove markdown code fence lines (```` ```json ````, ```` ``` ````, …).
pub fn strip_markdown_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the JSON object slice from arbitrary response text.
///
/// Handles fenced blocks, preamble before the object, and trailing prose
/// after it by scanning for the first `{` and the last `}`. Returns `None`
/// when no parseable object exists.
pub fn extract_json_object(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() < MIN_PLAUSIBLE_LENGTH && trimmed.contains("```") {
        debug!(response = %trimmed, "Truncated fenced response rejected");
        return None;
    }

    let cleaned = if trimmed.contains("```") {
        strip_markdown_fences(trimmed)
    } else {
        trimmed.to_string()
    };

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }

    let slice = cleaned[start..=end].to_string();
    // Validate by attempting a parse; malformed slices are unrecoverable.
    match serde_json::from_str::<serde_json::Value>(&slice) {
        Ok(_) => Some(slice),
        Err(e) => {
            debug!(error = %e, "Extracted slice is not valid JSON");
            None
        }
    }
}

/// Parse and validate an intent response into a `ScriptIntent`.
///
/// Validation rules: the object must carry a non-empty `segments` array,
/// and every segment must have `text` (string), `pause_after` (number),
/// `emphasis` (array of strings), `sentence_end` (boolean).
pub fn parse_intent_response(text: &str) -> Option<ScriptIntent> {
    let slice = extract_json_object(text)?;

    let value: serde_json::Value = match serde_json::from_str(&slice) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Intent JSON decode failed");
            return None;
        }
    };

    let segments = match value.get("segments").and_then(|s| s.as_array()) {
        Some(array) if !array.is_empty() => array,
        Some(_) => {
            warn!("Intent JSON has empty segments");
            return None;
        }
        None => {
            warn!("Intent JSON missing segments");
            return None;
        }
    };

    let mut parsed = Vec::with_capacity(segments.len());
    for (i, seg) in segments.iter().enumerate() {
        let Some(text) = seg.get("text").and_then(|v| v.as_str()) else {
            warn!(segment = i, "Segment text missing or not a string");
            return None;
        };
        let Some(pause_after) = seg.get("pause_after").and_then(|v| v.as_f64()) else {
            warn!(segment = i, "Segment pause_after missing or not numeric");
            return None;
        };
        let Some(emphasis) = seg.get("emphasis").and_then(|v| v.as_array()) else {
            warn!(segment = i, "Segment emphasis missing or not a list");
            return None;
        };
        let Some(sentence_end) = seg.get("sentence_end").and_then(|v| v.as_bool()) else {
            warn!(segment = i, "Segment sentence_end missing or not a bool");
            return None;
        };

        let emphasis: Vec<String> = emphasis
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect();

        parsed.push(SegmentIntent {
            text: text.to_string(),
            pause_after,
            emphasis,
            sentence_end,
        });
    }

    match ScriptIntent::new(parsed) {
        Ok(mut intent) => {
            intent.total_duration = value.get("total_duration").and_then(|v| v.as_f64());
            debug!(segments = intent.segment_count(), "Validated intent response");
            Some(intent)
        }
        Err(e) => {
            warn!(error = %e, "Parsed segments failed intent validation");
            None
        }
    }
}

/// Sentence-split plain text into a synthetic fallback intent: one segment
/// per sentence, a 0.3 s pause after each, no emphasis.
pub fn fallback_intent(text: &str) -> Option<ScriptIntent> {
    let segments: Vec<SegmentIntent> = split_sentences(text)
        .into_iter()
        .map(|sentence| {
            let sentence_end = sentence.ends_with(['.', '!', '?']);
            SegmentIntent {
                text: sentence,
                pause_after: 0.3,
                emphasis: Vec::new(),
                sentence_end,
            }
        })
        .collect();

    ScriptIntent::new(segments).ok()
}

/// Split text into sentences on terminal punctuation, keeping the
/// terminator attached.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"segments":[{"text":"Hi.","pause_after":0.3,"emphasis":[],"sentence_end":true}]}"#;

    #[test]
    fn test_bare_object_accepted() {
        let intent = parse_intent_response(VALID).unwrap();
        assert_eq!(intent.segment_count(), 1);
        assert_eq!(intent.segments[0].text, "Hi.");
    }

    #[test]
    fn test_fenced_object_with_preamble_accepted() {
        let body = format!("Here you go:\n```json\n{}\n```", VALID);
        let intent = parse_intent_response(&body).unwrap();
        assert_eq!(intent.segment_count(), 1);
    }

    #[test]
    fn test_object_with_trailing_prose_accepted() {
        let body = format!("{}\nHope that helps!", VALID);
        assert!(parse_intent_response(&body).is_some());
    }

    #[test]
    fn test_lone_fence_marker_rejected() {
        assert!(parse_intent_response("```json").is_none());
        assert!(extract_json_object("```json").is_none());
    }

    #[test]
    fn test_missing_segments_rejected() {
        assert!(parse_intent_response(r#"{"total_duration": 5.0, "x": 1}"#).is_none());
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(parse_intent_response(r#"{"segments": [], "pad": "xxxxxxxx"}"#).is_none());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(parse_intent_response(r#"{"segments": [{"text": "Hi."#).is_none());
    }

    #[test]
    fn test_wrong_field_types_rejected() {
        let body = r#"{"segments":[{"text":"Hi.","pause_after":"long","emphasis":[],"sentence_end":true}]}"#;
        assert!(parse_intent_response(body).is_none());
    }

    #[test]
    fn test_total_duration_carried() {
        let body = r#"{"segments":[{"text":"Hi.","pause_after":0.0,"emphasis":[],"sentence_end":true}],"total_duration":4.5}"#;
        let intent = parse_intent_response(body).unwrap();
        assert_eq!(intent.total_duration, Some(4.5));
    }

    #[test]
    fn test_strip_fences() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_markdown_fences(text).trim(), "{\"a\": 1}");
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First one. Second! Third? trailing bit");
        assert_eq!(
            sentences,
            vec!["First one.", "Second!", "Third?", "trailing bit"]
        );
    }

    #[test]
    fn test_fallback_intent_shape() {
        let intent = fallback_intent("Hello there. General greeting").unwrap();
        assert_eq!(intent.segment_count(), 2);
        assert_eq!(intent.segments[0].pause_after, 0.3);
        assert!(intent.segments[0].sentence_end);
        assert!(intent.segments[0].emphasis.is_empty());
        assert!(!intent.segments[1].sentence_end);
    }

    #[test]
    fn test_fallback_intent_empty_text_is_none() {
        assert!(fallback_intent("   ").is_none());
    }
}

use thiserror::Error;

use crate::models::Sentiment;

/// Errors from the LLM transport and validation layer. The race
/// orchestrator treats every variant the same way — fall back to the
/// heuristic — but each is logged distinctly.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no LLM provider configured")]
    NoProviderConfigured,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream returned malformed output: {0}")]
    UpstreamBadFormat(String),
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Validated, closed-set classification produced by either LLM
/// provider or the mock path.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub is_urgent: bool,
    pub confidence_score: f64,
}

/// Raw shape the model is asked to emit. Fields are intentionally
/// loosely typed (`sentiment`/`topics` as free strings) because a
/// misbehaving LLM is exactly what `validate` (see `client.rs`) exists
/// to defend against.
#[derive(Debug, serde::Deserialize)]
pub struct RawClassification {
    #[serde(default)]
    pub sentiment: serde_json::Value,
    #[serde(default)]
    pub topics: serde_json::Value,
    #[serde(default)]
    pub is_urgent: serde_json::Value,
}

/// Validates a raw LLM reply against the closed sentiment/topic set,
/// per spec.md §4.B's response-validation rules: an unrecognized
/// sentiment string falls back to `NEUTRAL`; a missing or non-list
/// topics field falls back to `["General"]`; `is_urgent` is coerced to
/// a bool.
pub fn validate(raw: RawClassification) -> ClassificationResult {
    let sentiment = raw
        .sentiment
        .as_str()
        .map(Sentiment::parse_lenient)
        .unwrap_or(Sentiment::Neutral);

    let topics = match raw.topics.as_array() {
        Some(arr) if !arr.is_empty() => {
            let strings: Vec<String> =
                arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            if strings.is_empty() { vec!["General".to_string()] } else { strings }
        },
        _ => vec!["General".to_string()],
    };

    let is_urgent = match &raw.is_urgent {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    ClassificationResult { sentiment, topics, is_urgent, confidence_score: 0.99 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sentiment_falls_back_to_neutral() {
        let raw = RawClassification {
            sentiment: serde_json::json!("SUPER_HAPPY"),
            topics: serde_json::json!("NotAList"),
            is_urgent: serde_json::json!(false),
        };
        let result = validate(raw);
        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.topics, vec!["General".to_string()]);
        assert!(!result.is_urgent);
    }

    #[test]
    fn well_formed_reply_passes_through() {
        let raw = RawClassification {
            sentiment: serde_json::json!("NEGATIVE"),
            topics: serde_json::json!(["Billing"]),
            is_urgent: serde_json::json!(true),
        };
        let result = validate(raw);
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert_eq!(result.topics, vec!["Billing".to_string()]);
        assert!(result.is_urgent);
    }
}

//! Feedback data model.
//!
//! The sole persisted entity. Enums model the closed sets from the
//! specification (sentiment, source, provider, department, status,
//! priority) as tagged variants with stable wire strings rather than
//! free strings, per the design note that these should round-trip
//! through storage without silently admitting new values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a sentiment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    #[serde(rename = "POSITIVE")]
    Positive,
    #[serde(rename = "NEGATIVE")]
    Negative,
    #[serde(rename = "NEUTRAL")]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Neutral => "NEUTRAL",
        }
    }

    /// Parse from an uppercase wire string, defaulting to `Neutral` for
    /// anything unrecognized. Used both when reading from the store
    /// and when validating an adversarial LLM reply.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "POSITIVE" => Self::Positive,
            "NEGATIVE" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which classification path produced the stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisSource {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "FALLBACK")]
    Fallback,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::Fallback => "FALLBACK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AI" => Some(Self::Ai),
            "FALLBACK" => Some(Self::Fallback),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag for which concrete classifier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiProvider {
    #[serde(rename = "primary-llm")]
    PrimaryLlm,
    #[serde(rename = "secondary-llm")]
    SecondaryLlm,
    #[serde(rename = "heuristic")]
    Heuristic,
    #[serde(rename = "mock")]
    Mock,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryLlm => "primary-llm",
            Self::SecondaryLlm => "secondary-llm",
            Self::Heuristic => "heuristic",
            Self::Mock => "mock",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "primary-llm" => Self::PrimaryLlm,
            "secondary-llm" => Self::SecondaryLlm,
            "heuristic" => Self::Heuristic,
            "mock" => Self::Mock,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing destination derived from `topics` via the fixed mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    Finance,
    Engineering,
    Product,
    InfoSec,
    Support,
    Unassigned,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finance => "Finance",
            Self::Engineering => "Engineering",
            Self::Product => "Product",
            Self::InfoSec => "InfoSec",
            Self::Support => "Support",
            Self::Unassigned => "Unassigned",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Finance" => Self::Finance,
            "Engineering" => Self::Engineering,
            "Product" => Self::Product,
            "InfoSec" => Self::InfoSec,
            "Support" => Self::Support,
            _ => Self::Unassigned,
        }
    }

    /// First-match-wins mapping from a topic list to a department.
    /// Unknown topic tags (e.g. introduced by an adversarial LLM
    /// reply) are silently skipped, not rejected.
    pub fn from_topics(topics: &[String]) -> Self {
        for topic in topics {
            match topic.as_str() {
                "Billing" => return Self::Finance,
                "Technical" => return Self::Engineering,
                "UX" => return Self::Product,
                "Security" => return Self::InfoSec,
                "General" => return Self::Support,
                _ => continue,
            }
        }
        Self::Unassigned
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "RESOLVED")]
    Resolved,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "RESOLVED" => Self::Resolved,
            _ => Self::Open,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket priority (not derived by the classifiers in this spec; fixed
/// at `Medium` on creation and left for downstream triage to adjust).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "LOW" => Self::Low,
            "HIGH" => Self::High,
            "CRITICAL" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sole persisted entity (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub raw_content: String,
    pub content_hash: String,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub is_urgent: bool,
    pub confidence_score: f64,
    pub source: AnalysisSource,
    pub ai_provider: AiProvider,
    pub department: Department,
    pub status: TicketStatus,
    pub priority: Priority,
    pub resolution_note: Option<String>,
    pub needs_review: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /feedback`.
#[derive(Debug, Deserialize)]
pub struct FeedbackInput {
    pub raw_content: String,
}

/// Request body for `PATCH /feedback/:id/resolve`.
#[derive(Debug, Deserialize)]
pub struct ResolutionRequest {
    pub note: Option<String>,
}

/// One reconciliation audit event (spec.md §9 "implementers may add one").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationEvent {
    pub id: i64,
    pub feedback_id: uuid::Uuid,
    pub previous_source: AnalysisSource,
    pub previous_sentiment: Sentiment,
    pub previous_is_urgent: bool,
    pub new_sentiment: Sentiment,
    pub new_is_urgent: bool,
    pub drift_detected: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_mapping_is_first_match() {
        let topics = vec!["UX".to_string(), "Billing".to_string()];
        assert_eq!(Department::from_topics(&topics), Department::Product);
    }

    #[test]
    fn department_mapping_skips_unknown_tags() {
        let topics = vec!["Weather".to_string(), "Security".to_string()];
        assert_eq!(Department::from_topics(&topics), Department::InfoSec);
    }

    #[test]
    fn department_mapping_falls_back_to_unassigned() {
        let topics = vec!["Weather".to_string()];
        assert_eq!(Department::from_topics(&topics), Department::Unassigned);
    }

    #[test]
    fn sentiment_parse_lenient_defaults_to_neutral() {
        assert_eq!(Sentiment::parse_lenient("SUPER_HAPPY"), Sentiment::Neutral);
        assert_eq!(Sentiment::parse_lenient("positive"), Sentiment::Positive);
    }
}

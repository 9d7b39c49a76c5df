//! The fast, deterministic classification path: no I/O, no LLM, no
//! suspension points. A VADER-style lexicon sentiment score combined
//! with keyword-based topic and urgency rules.
//!
//! Rust has no idiomatic binding of the VADER lexicon algorithm, so
//! this reimplements its core scoring natively: per-token lexicon
//! lookup, negation flips, booster/dampener adjustment, punctuation
//! emphasis, ALL-CAPS emphasis, then the `x / sqrt(x*x + 15)`
//! normalization that keeps the compound score in [-1, 1].

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::models::{AiProvider, Department, Sentiment};

/// Result of the heuristic pass; mirrors the fields the race
/// orchestrator needs from either classification path.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicResult {
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub is_urgent: bool,
    pub confidence_score: f64,
    pub ai_provider: AiProvider,
}

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nobody", "nothing", "neither", "nowhere", "cannot", "cant",
    "can't", "don't", "dont", "won't", "wont", "isn't", "isnt", "wasn't", "wasnt", "shouldn't",
    "shouldnt", "wouldn't", "wouldnt", "couldn't", "couldnt", "without", "hardly", "barely",
    "scarcely",
];

const BOOSTER_INCREASE: &[(&str, f64)] = &[
    ("very", 0.293),
    ("extremely", 0.293),
    ("absolutely", 0.293),
    ("completely", 0.293),
    ("totally", 0.293),
    ("incredibly", 0.293),
    ("really", 0.293),
    ("so", 0.293),
    ("particularly", 0.293),
    ("especially", 0.293),
];

const BOOSTER_DECREASE: &[(&str, f64)] = &[
    ("slightly", -0.293),
    ("somewhat", -0.293),
    ("barely", -0.293),
    ("kind", -0.293),
    ("sort", -0.293),
];

/// A small, hand-curated lexicon covering the sentiment vocabulary
/// exercised by customer-feedback text. Scores follow VADER's
/// roughly -4..4 per-word intensity scale.
static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("good", 1.9),
        ("great", 3.1),
        ("excellent", 3.4),
        ("amazing", 3.4),
        ("awesome", 3.1),
        ("love", 3.2),
        ("loved", 3.0),
        ("happy", 2.7),
        ("pleased", 2.3),
        ("satisfied", 2.0),
        ("perfect", 3.0),
        ("helpful", 2.0),
        ("fast", 1.5),
        ("easy", 1.7),
        ("nice", 1.8),
        ("fantastic", 3.3),
        ("wonderful", 3.1),
        ("thanks", 1.9),
        ("thank", 1.7),
        ("recommend", 1.8),
        ("bad", -2.5),
        ("terrible", -3.2),
        ("horrible", -3.3),
        ("awful", -3.1),
        ("worst", -3.3),
        ("hate", -3.0),
        ("hated", -2.9),
        ("angry", -2.7),
        ("frustrated", -2.2),
        ("frustrating", -2.2),
        ("disappointed", -2.3),
        ("disappointing", -2.2),
        ("broken", -2.2),
        ("useless", -2.5),
        ("slow", -1.5),
        ("bug", -1.6),
        ("bugs", -1.6),
        ("crash", -2.3),
        ("crashed", -2.3),
        ("crashes", -2.3),
        ("error", -1.6),
        ("errors", -1.6),
        ("fail", -2.2),
        ("failed", -2.2),
        ("failing", -2.1),
        ("down", -1.6),
        ("ugly", -2.0),
        ("confusing", -1.9),
        ("unacceptable", -2.8),
        ("lawsuit", -2.9),
        ("sue", -2.6),
        ("fraud", -3.0),
        ("scam", -3.0),
        ("stolen", -2.7),
        ("rude", -2.2),
        ("waste", -2.0),
        ("disgusting", -3.0),
        ("furious", -2.9),
        ("unhappy", -2.0),
        ("poor", -1.9),
    ])
});

fn normalize(score: f64) -> f64 {
    let alpha = 15.0;
    score / (score * score + alpha).sqrt()
}

fn clean_token(token: &str) -> String {
    token.chars().filter(|c| c.is_alphanumeric() || *c == '\'').collect::<String>().to_lowercase()
}

/// True if `token` has at least two letters and every letter is
/// uppercase. Checked against the original, un-lowercased token, since
/// `clean_token` itself discards casing.
fn is_all_caps(token: &str) -> bool {
    let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
}

/// VADER-style compound sentiment score in [-1.0, 1.0].
fn vader_compound(text: &str) -> f64 {
    let raw_tokens: Vec<&str> = text.split_whitespace().collect();
    let tokens: Vec<String> = raw_tokens.iter().map(|t| clean_token(t)).collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let mut sentiments: Vec<f64> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let Some(&base) = LEXICON.get(token.as_str()) else { continue };
        let mut value = base;

        // ALL-CAPS emphasis: look at the original token in the source text.
        if is_all_caps(raw_tokens[i]) {
            value += if value > 0.0 { 0.733 } else { -0.733 };
        }

        // Negation and boosters in the preceding 3-word window.
        let window_start = i.saturating_sub(3);
        let mut negated = false;
        let mut booster = 0.0;
        for prior in &tokens[window_start..i] {
            if NEGATIONS.contains(&prior.as_str()) {
                negated = true;
            }
            if let Some((_, b)) = BOOSTER_INCREASE.iter().find(|(w, _)| *w == prior) {
                booster += *b;
            }
            if let Some((_, b)) = BOOSTER_DECREASE.iter().find(|(w, _)| *w == prior) {
                booster += *b;
            }
        }

        if negated {
            value *= -0.74;
        } else if booster != 0.0 {
            value += if value > 0.0 { booster } else { -booster };
        }

        sentiments.push(value);
    }

    if sentiments.is_empty() {
        return 0.0;
    }

    let mut total: f64 = sentiments.iter().sum();

    // Exclamation marks amplify whatever sentiment is already present.
    let exclamations = text.chars().filter(|&c| c == '!').count().min(4);
    if exclamations > 0 {
        let boost = exclamations as f64 * 0.292;
        total += if total > 0.0 { boost } else { -boost };
    }

    normalize(total)
}

const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("Billing", &["charge", "credit", "card", "refund", "bill", "invoice", "cost"]),
    ("Technical", &["bug", "crash", "error", "fail", "slow", "login", "app", "500", "404"]),
    ("UX", &["ugly", "confusing", "hard", "color", "button", "nav", "interface"]),
    ("Security", &["password", "hacked", "breach", "suspicious", "auth", "phishing"]),
];

const DANGER_KEYWORDS: &[&str] =
    &["lawsuit", "sue", "illegal", "gdpr", "emergency", "fraud", "police"];

/// Runs the full heuristic pass over already-sanitized text.
pub fn analyze(text: &str) -> HeuristicResult {
    let compound = vader_compound(text);

    let sentiment = if compound >= 0.05 {
        Sentiment::Positive
    } else if compound <= -0.05 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    let text_lower = text.to_lowercase();
    let mut topics: Vec<String> = TOPIC_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| text_lower.contains(w)))
        .map(|(topic, _)| topic.to_string())
        .collect();
    if topics.is_empty() {
        topics.push("General".to_string());
    }

    let mut is_urgent = DANGER_KEYWORDS.iter().any(|w| text_lower.contains(w));
    if sentiment == Sentiment::Negative && compound < -0.6 {
        is_urgent = true;
    }

    HeuristicResult {
        sentiment,
        topics,
        is_urgent,
        confidence_score: 0.5,
        ai_provider: AiProvider::Heuristic,
    }
}

/// Reapplies the department mapping to a heuristic (or AI) topic list.
pub fn resolve_department(topics: &[String]) -> Department {
    Department::from_topics(topics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_text_scores_positive() {
        let result = analyze("This is an amazing, wonderful product, thank you!");
        assert_eq!(result.sentiment, Sentiment::Positive);
    }

    #[test]
    fn negative_text_scores_negative() {
        let result = analyze("This is terrible and the app keeps crashing.");
        assert_eq!(result.sentiment, Sentiment::Negative);
    }

    #[test]
    fn neutral_text_has_no_strong_lexicon_hits() {
        let result = analyze("The meeting is scheduled for Tuesday at noon.");
        assert_eq!(result.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn danger_keyword_forces_urgency_regardless_of_sentiment() {
        let result = analyze("The app is down! Lawsuit incoming!");
        assert!(result.is_urgent);
        assert!(result.topics.contains(&"Technical".to_string()));
    }

    #[test]
    fn strongly_negative_text_is_urgent_even_without_danger_words() {
        let result = analyze(
            "This is absolutely terrible, horrible, disgusting, the worst experience I have ever had.",
        );
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert!(result.is_urgent);
    }

    #[test]
    fn empty_topic_hits_fall_back_to_general() {
        let result = analyze("Just saying hello.");
        assert_eq!(result.topics, vec!["General".to_string()]);
    }

    #[test]
    fn negation_flips_polarity() {
        let not_good = vader_compound("This is not good at all.");
        let good = vader_compound("This is good.");
        assert!(not_good < good);
    }

    #[test]
    fn all_caps_amplifies_beyond_the_lowercase_form() {
        let shouting = vader_compound("This is GREAT.");
        let calm = vader_compound("This is great.");
        assert!(shouting > calm);
    }
}

//! Critique parsing and consensus scoring

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::llm::types::{Consensus, CouncilCritique, CouncilResponse, ResponseScore};
use crate::sanitize::{re, strip_reasoning};

/// Score used when a critique cannot be parsed at all
pub const NEUTRAL_SCORE: f64 = 5.0;

static OUT_OF_TEN: LazyLock<Regex> = LazyLock::new(|| re(r"(\d+(?:\.\d+)?)\s*/\s*10\b"));
static SCORE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bscore\b\W{0,3}(\d+(?:\.\d+)?)"));

/// Fields of a critique as the model returns them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedCritique {
    pub score: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Deserialize)]
struct CritiqueJson {
    score: ScoreValue,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
}

/// Models send the score as a number or, now and then, a string
#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Number(f64),
    Text(String),
}

impl ScoreValue {
    fn value(&self) -> Option<f64> {
        match self {
            ScoreValue::Number(n) => Some(*n),
            ScoreValue::Text(s) => s.trim().trim_end_matches("/10").trim().parse().ok(),
        }
    }
}

/// Parse a critic's reply. Never fails: unparseable output gets the neutral
/// score and empty lists.
pub fn parse_critique(raw: &str) -> ParsedCritique {
    let text = strip_reasoning(raw);
    let text = text.trim();

    if let Some(parsed) = parse_json(text) {
        return parsed;
    }

    let score = OUT_OF_TEN
        .captures(text)
        .or_else(|| SCORE_LABEL.captures(text))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map_or(NEUTRAL_SCORE, clamp_score);

    ParsedCritique {
        score,
        feedback: text.to_string(),
        strengths: Vec::new(),
        weaknesses: Vec::new(),
    }
}

/// The outermost `{...}` span, so fences and surrounding prose are ignored
fn parse_json(text: &str) -> Option<ParsedCritique> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: CritiqueJson = serde_json::from_str(&text[start..=end]).ok()?;
    let score = parsed.score.value().filter(|s| s.is_finite())?;

    Some(ParsedCritique {
        score: clamp_score(score),
        feedback: parsed.feedback.trim().to_string(),
        strengths: parsed.strengths,
        weaknesses: parsed.weaknesses,
    })
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(1.0, 10.0)
}

/// Aggregate critiques into per-response averages and pick the best.
///
/// Only responses with at least one critique appear in `scores` and can be
/// best; ties go to the earlier response. With no critiques at all the first
/// response wins. `synthesized` starts out false.
pub fn compute_consensus(responses: &[CouncilResponse], critiques: &[CouncilCritique]) -> Consensus {
    let scores: Vec<ResponseScore> = responses
        .iter()
        .filter_map(|response| {
            let received: Vec<f64> = critiques
                .iter()
                .filter(|c| c.response_id == response.id)
                .map(|c| c.score)
                .collect();
            if received.is_empty() {
                return None;
            }
            Some(ResponseScore {
                response_id: response.id.clone(),
                average_score: mean(&received),
                critique_count: received.len(),
            })
        })
        .collect();

    let mut best: Option<&ResponseScore> = None;
    for score in &scores {
        if best.map_or(true, |b| score.average_score > b.average_score) {
            best = Some(score);
        }
    }

    let best_response_id = best
        .map(|s| s.response_id.clone())
        .or_else(|| responses.first().map(|r| r.id.clone()))
        .unwrap_or_default();

    let all: Vec<f64> = critiques.iter().map(|c| c.score).collect();

    Consensus {
        average_score: mean(&all),
        best_response_id,
        synthesized: false,
        scores,
    }
}

/// Responses ordered by average score, best first. Uncritiqued responses go
/// last; fan-out order breaks ties.
pub fn rank_responses<'a>(
    responses: &'a [CouncilResponse],
    consensus: &Consensus,
) -> Vec<&'a CouncilResponse> {
    let score_of = |id: &str| {
        consensus
            .scores
            .iter()
            .find(|s| s.response_id == id)
            .map(|s| s.average_score)
    };

    let mut ranked: Vec<&CouncilResponse> = responses.iter().collect();
    ranked.sort_by(|a, b| {
        let a = score_of(&a.id).unwrap_or(f64::NEG_INFINITY);
        let b = score_of(&b.id).unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    ranked
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ProviderId;
    use pretty_assertions::assert_eq;

    fn response(id: &str) -> CouncilResponse {
        CouncilResponse {
            id: id.to_string(),
            content: format!("answer {}", id),
            provider: ProviderId::Groq,
            model: "m".to_string(),
            tokens: 10,
        }
    }

    fn critique(target: &str, critic: &str, score: f64) -> CouncilCritique {
        CouncilCritique {
            response_id: target.to_string(),
            critic_id: critic.to_string(),
            score,
            feedback: String::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed = parse_critique(
            r#"{"score": 8, "feedback": "Solid plan", "strengths": ["clear"], "weaknesses": ["no numbers"]}"#,
        );
        assert_eq!(
            parsed,
            ParsedCritique {
                score: 8.0,
                feedback: "Solid plan".to_string(),
                strengths: vec!["clear".to_string()],
                weaknesses: vec!["no numbers".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_fenced_json_with_reasoning() {
        let raw = "<think>the {draft} looks fine</think>Here you go:\n```json\n{\"score\": \"7\", \"feedback\": \"ok\"}\n```";
        let parsed = parse_critique(raw);
        assert_eq!(parsed.score, 7.0);
        assert_eq!(parsed.feedback, "ok");
        assert!(parsed.strengths.is_empty());
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(parse_critique(r#"{"score": 14}"#).score, 10.0);
        assert_eq!(parse_critique(r#"{"score": 0}"#).score, 1.0);
    }

    #[test]
    fn test_out_of_ten_fallback() {
        let parsed = parse_critique("I'd give this 6/10 overall.");
        assert_eq!(parsed.score, 6.0);
        assert_eq!(parsed.feedback, "I'd give this 6/10 overall.");
    }

    #[test]
    fn test_score_label_fallback() {
        assert_eq!(parse_critique("Score: 9. Great detail.").score, 9.0);
    }

    #[test]
    fn test_unparseable_is_neutral() {
        let parsed = parse_critique("Looks reasonable to me.");
        assert_eq!(parsed.score, NEUTRAL_SCORE);
        assert!(parsed.weaknesses.is_empty());
    }

    #[test]
    fn test_consensus_picks_highest_average() {
        let responses = [response("Response A"), response("Response B"), response("Response C")];
        let critiques = [
            critique("Response A", "Response B", 6.0),
            critique("Response A", "Response C", 8.0),
            critique("Response B", "Response A", 9.0),
            critique("Response B", "Response C", 8.0),
            critique("Response C", "Response A", 4.0),
        ];

        let consensus = compute_consensus(&responses, &critiques);
        assert_eq!(consensus.best_response_id, "Response B");
        assert_eq!(consensus.scores.len(), 3);
        assert_eq!(consensus.scores[1].average_score, 8.5);
        assert_eq!(consensus.average_score, 7.0);
        assert!(!consensus.synthesized);
    }

    #[test]
    fn test_tie_goes_to_earliest() {
        let responses = [response("Response C"), response("Response A")];
        let critiques = [
            critique("Response A", "Response C", 7.0),
            critique("Response C", "Response A", 7.0),
        ];
        assert_eq!(compute_consensus(&responses, &critiques).best_response_id, "Response C");
    }

    #[test]
    fn test_uncritiqued_response_cannot_win() {
        let responses = [response("Response A"), response("Response B")];
        let critiques = [critique("Response B", "Response A", 2.0)];

        let consensus = compute_consensus(&responses, &critiques);
        assert_eq!(consensus.best_response_id, "Response B");
        assert_eq!(consensus.scores.len(), 1);
    }

    #[test]
    fn test_no_critiques_first_wins() {
        let responses = [response("Response B"), response("Response A")];
        let consensus = compute_consensus(&responses, &[]);
        assert_eq!(consensus.best_response_id, "Response B");
        assert_eq!(consensus.average_score, 0.0);
    }

    #[test]
    fn test_ranking() {
        let responses = [response("Response A"), response("Response B"), response("Response C")];
        let critiques = [
            critique("Response A", "Response B", 5.0),
            critique("Response C", "Response A", 9.0),
        ];
        let consensus = compute_consensus(&responses, &critiques);

        let ranked: Vec<&str> = rank_responses(&responses, &consensus)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ranked, vec!["Response C", "Response A", "Response B"]);
    }
}

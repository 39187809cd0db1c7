use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of judging one candidate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// The judge says both tickets report the same problem.
    Confirmed,
    /// The judge says they differ.
    Refuted,
    /// No usable judgement: provider error, timeout or unparseable output.
    Failed(String),
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Verdict::Confirmed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Verdict::Failed(_))
    }
}

/// Per-candidate adjudication result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicationVerdict {
    pub ticket_id: String,
    pub verdict: Verdict,
    /// Same as `verdict.is_duplicate()`; kept flat for report consumers.
    pub is_duplicate: bool,
    /// Judge's confidence in `[0, 1]`, when it gave one.
    pub confidence: Option<f32>,
    pub explanation: String,
    pub latency_ms: u64,
    pub attempts: u32,
}

impl AdjudicationVerdict {
    pub fn failed(ticket_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            verdict: Verdict::Failed(reason.into()),
            is_duplicate: false,
            confidence: None,
            explanation: String::new(),
            latency_ms: 0,
            attempts: 0,
        }
    }

    pub(crate) fn from_judgement(ticket_id: &str, judgement: Judgement) -> Self {
        let verdict = if judgement.is_duplicate {
            Verdict::Confirmed
        } else {
            Verdict::Refuted
        };
        Self {
            ticket_id: ticket_id.to_string(),
            is_duplicate: verdict.is_duplicate(),
            verdict,
            confidence: judgement.confidence,
            explanation: judgement.explanation,
            latency_ms: 0,
            attempts: 0,
        }
    }
}

/// A judge response that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    pub is_duplicate: bool,
    pub confidence: Option<f32>,
    pub explanation: String,
}

/// Parse a judge's raw text into a [`Judgement`].
///
/// Accepts the bare JSON object, the object inside a ```` ```json ```` fence,
/// or the first `{...}` span inside surrounding prose. `is_duplicate` must be
/// a JSON boolean. `confidence` is clamped to `[0, 1]`; values in `(1, 100]`
/// are read as percentages.
pub fn parse_verdict(raw: &str) -> Result<Judgement, String> {
    let body = extract_json_object(raw).ok_or_else(|| "no JSON object in response".to_string())?;
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON in response: {e}"))?;

    let obj = value
        .as_object()
        .ok_or_else(|| "response JSON is not an object".to_string())?;

    let is_duplicate = match obj.get("is_duplicate") {
        Some(Value::Bool(b)) => *b,
        Some(other) => return Err(format!("`is_duplicate` must be a boolean, got {other}")),
        None => return Err("missing `is_duplicate`".into()),
    };

    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().map(normalize_confidence),
        _ => None,
    };

    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(Judgement {
        is_duplicate,
        confidence,
        explanation,
    })
}

fn normalize_confidence(raw: f64) -> f32 {
    let scaled = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    scaled.clamp(0.0, 1.0) as f32
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();

    let unfenced = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => &after[..end],
                None => after,
            }
        }
        None => trimmed,
    };

    let open = unfenced.find('{')?;
    let close = unfenced.rfind('}')?;
    (close > open).then(|| &unfenced[open..=close])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object() {
        let j = parse_verdict(
            r#"{"is_duplicate": true, "confidence": 0.92, "explanation": "Same crash on save."}"#,
        )
        .unwrap();
        assert!(j.is_duplicate);
        assert_eq!(j.confidence, Some(0.92));
        assert_eq!(j.explanation, "Same crash on save.");
    }

    #[test]
    fn parses_fenced_object_with_prose() {
        let raw = "Here is my assessment:\n```json\n{\"is_duplicate\": false, \"confidence\": 80, \"explanation\": \"Different modules.\"}\n```\nThanks.";
        let j = parse_verdict(raw).unwrap();
        assert!(!j.is_duplicate);
        assert_eq!(j.confidence, Some(0.8));
    }

    #[test]
    fn rejects_non_boolean_flag() {
        let err = parse_verdict(r#"{"is_duplicate": "yes"}"#).unwrap_err();
        assert!(err.contains("boolean"));
        assert!(parse_verdict(r#"{"confidence": 0.3}"#).unwrap_err().contains("missing"));
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_verdict("They look like duplicates to me.").is_err());
        assert!(parse_verdict("{not json}").is_err());
    }

    #[test]
    fn confidence_is_optional_and_clamped() {
        let j = parse_verdict(r#"{"is_duplicate": true}"#).unwrap();
        assert_eq!(j.confidence, None);
        assert_eq!(j.explanation, "");

        let j = parse_verdict(r#"{"is_duplicate": true, "confidence": -3}"#).unwrap();
        assert_eq!(j.confidence, Some(0.0));
    }

    #[test]
    fn verdict_serializes_tagged() {
        let json = serde_json::to_value(Verdict::Failed("timeout".into())).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "timeout");
        let json = serde_json::to_value(Verdict::Confirmed).unwrap();
        assert_eq!(json["outcome"], "confirmed");
    }
}

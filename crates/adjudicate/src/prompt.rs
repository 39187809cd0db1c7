use serde::{Deserialize, Serialize};

/// The ticket being checked for duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDocument {
    pub ticket_id: String,
    pub text: String,
}

impl QueryDocument {
    pub fn new(ticket_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            text: text.into(),
        }
    }
}

/// A nearest-neighbor hit to be judged against the query ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDocument {
    pub ticket_id: String,
    /// Canonical text of the candidate; `None` when it could not be loaded.
    pub text: Option<String>,
    pub similarity: f32,
    pub status: Option<String>,
    pub resolution: Option<String>,
}

impl CandidateDocument {
    pub fn new(ticket_id: impl Into<String>, text: impl Into<String>, similarity: f32) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            text: Some(text.into()),
            similarity,
            status: None,
            resolution: None,
        }
    }
}

/// Everything a [`JudgeProvider`](crate::JudgeProvider) needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeRequest {
    pub query_ticket_id: String,
    pub candidate_ticket_id: String,
    pub query_text: String,
    pub candidate_text: String,
    pub similarity: f32,
    /// Fully rendered instruction for text-in/text-out models.
    pub prompt: String,
}

impl JudgeRequest {
    pub fn new(query: &QueryDocument, candidate: &CandidateDocument, candidate_text: &str) -> Self {
        Self {
            query_ticket_id: query.ticket_id.clone(),
            candidate_ticket_id: candidate.ticket_id.clone(),
            query_text: query.text.clone(),
            candidate_text: candidate_text.to_string(),
            similarity: candidate.similarity,
            prompt: render_prompt(query, candidate, candidate_text),
        }
    }
}

pub const SYSTEM_INSTRUCTION: &str = "You are a support engineer triaging issue-tracker tickets. \
You answer with a single JSON object and nothing else.";

fn render_prompt(query: &QueryDocument, candidate: &CandidateDocument, candidate_text: &str) -> String {
    let status = candidate.status.as_deref().unwrap_or("N/A");
    let resolution = candidate.resolution.as_deref().unwrap_or("N/A");
    format!(
        "Decide whether the NEW ticket and the EXISTING ticket report the same underlying problem.\n\
Treat them as duplicates only if fixing one would fix the other. Similar wording alone is not enough.\n\
\n\
## NEW ticket {query_id}\n\
```\n{query_text}\n```\n\
\n\
## EXISTING ticket {candidate_id}\n\
Status: {status}\n\
Resolution: {resolution}\n\
Vector similarity: {similarity:.3}\n\
```\n{candidate_text}\n```\n\
\n\
Respond with exactly this JSON object:\n\
{{\"is_duplicate\": true or false, \"confidence\": number between 0 and 1, \"explanation\": \"one or two sentences\"}}\n",
        query_id = query.ticket_id,
        query_text = query.text,
        candidate_id = candidate.ticket_id,
        similarity = candidate.similarity,
    )
}

use std::borrow::Cow;
use std::collections::HashMap;

use ingest::{Comment, IssueLink, LinkDirection, Ticket, TicketFields};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::NormalizerConfig;
use crate::document::ConsolidatedDocument;
use crate::error::CanonicalError;
use crate::hash::hash_canonical_bytes;
use crate::whitespace::{clean_lines, collapse_whitespace};

/// Main entry point. Merges a ticket and the text extracted from its
/// attachments into one [`ConsolidatedDocument`].
///
/// Layout, with empty sections skipped:
///
/// ```text
/// Title: <title>
///
/// Description:
/// <body>
///
/// Fields:
/// Severity: <severity>
/// Priority: <priority>
/// Affects versions: <v1, v2>
/// Fix versions: <v3>
///
/// Links:
/// <outward|inward> <link type> <KEY>: <summary>
///
/// Comment 1:
/// <oldest comment>
///
/// Attachment 1 (<filename>):
/// <extracted text>
/// ```
///
/// `attachment_text` is keyed by attachment id; attachments are visited in
/// the ticket's own order so the layout does not depend on map iteration.
pub fn consolidate(
    ticket: &Ticket,
    attachment_text: &HashMap<String, String>,
    cfg: &NormalizerConfig,
) -> Result<ConsolidatedDocument, CanonicalError> {
    cfg.validate()?;

    let ticket_id = ticket.id.trim();
    if ticket_id.is_empty() {
        return Err(CanonicalError::MissingTicketId);
    }

    let mut sections: Vec<String> = Vec::new();

    let title = collapse_whitespace(&normalize(&ticket.title, cfg));
    if !title.is_empty() {
        sections.push(format!("Title: {title}"));
    }

    let body = clean_lines(&normalize(&ticket.body, cfg));
    if !body.is_empty() {
        sections.push(format!("Description:\n{body}"));
    }

    // Structured fields and links alone do not make a document.
    let mut metadata_sections = 0usize;
    for section in [
        field_section(&ticket.fields, cfg),
        link_section(&ticket.links, cfg),
    ]
    .into_iter()
    .flatten()
    {
        sections.push(section);
        metadata_sections += 1;
    }

    for (idx, comment) in chronological(&ticket.comments).into_iter().enumerate() {
        let text = clean_lines(&normalize(&comment.body, cfg));
        if !text.is_empty() {
            sections.push(format!("Comment {}:\n{text}", idx + 1));
        }
    }

    let mut attachment_sections = 0usize;
    for (idx, attachment) in ticket.attachments.iter().enumerate() {
        let Some(raw) = attachment_text.get(&attachment.id) else {
            continue;
        };
        let text = clean_lines(&normalize(raw, cfg));
        if text.is_empty() {
            continue;
        }
        let name = collapse_whitespace(&normalize(&attachment.filename, cfg));
        sections.push(format!("Attachment {} ({name}):\n{text}", idx + 1));
        attachment_sections += 1;
    }

    if sections.len() == metadata_sections {
        return Err(CanonicalError::EmptyDocument(ticket_id.to_string()));
    }

    let full = sections.join("\n\n");
    let original_bytes = full.len();
    let (text, truncated) = truncate_with_marker(full, cfg.max_bytes, &cfg.truncation_marker);

    if truncated {
        warn!(
            ticket_id,
            original_bytes,
            kept_bytes = text.len(),
            max_bytes = cfg.max_bytes,
            "ticket content truncated before embedding"
        );
    }

    let fingerprint = hash_canonical_bytes(cfg.version, text.as_bytes());

    Ok(ConsolidatedDocument {
        ticket_id: ticket_id.to_string(),
        text,
        fingerprint,
        canonical_version: cfg.version,
        truncated,
        original_bytes,
        attachment_sections,
    })
}

fn normalize<'a>(text: &'a str, cfg: &NormalizerConfig) -> Cow<'a, str> {
    if cfg.normalize_unicode {
        Cow::Owned(text.nfkc().collect::<String>())
    } else {
        Cow::Borrowed(text)
    }
}

/// Fields that describe the problem itself. Workflow state (status,
/// resolution, dates) is left out so that triage does not change the
/// fingerprint.
fn field_section(fields: &TicketFields, cfg: &NormalizerConfig) -> Option<String> {
    let mut lines = Vec::new();
    let mut push = |label: &str, value: String| {
        let value = collapse_whitespace(&normalize(&value, cfg));
        if !value.is_empty() {
            lines.push(format!("{label}: {value}"));
        }
    };
    push("Severity", fields.severity.clone().unwrap_or_default());
    push("Priority", fields.priority.clone().unwrap_or_default());
    push("Affects versions", fields.affects_versions.join(", "));
    push("Fix versions", fields.fix_versions.join(", "));

    (!lines.is_empty()).then(|| format!("Fields:\n{}", lines.join("\n")))
}

fn link_section(links: &[IssueLink], cfg: &NormalizerConfig) -> Option<String> {
    let lines: Vec<String> = links
        .iter()
        .filter(|link| !link.key.trim().is_empty())
        .map(|link| {
            let direction = match link.direction {
                LinkDirection::Outward => "outward",
                LinkDirection::Inward => "inward",
            };
            let link_type = collapse_whitespace(&normalize(&link.link_type, cfg));
            let mut line = format!("{direction} {link_type} {}", link.key.trim());
            if let Some(summary) = link.summary.as_deref() {
                let summary = collapse_whitespace(&normalize(summary, cfg));
                if !summary.is_empty() {
                    line.push_str(": ");
                    line.push_str(&summary);
                }
            }
            line
        })
        .collect();

    (!lines.is_empty()).then(|| format!("Links:\n{}", lines.join("\n")))
}

/// Oldest first. Undated comments keep their relative order after dated ones.
fn chronological(comments: &[Comment]) -> Vec<&Comment> {
    let mut ordered: Vec<&Comment> = comments.iter().collect();
    ordered.sort_by_key(|c| (c.created_at.is_none(), c.created_at));
    ordered
}

/// Cut `text` so that the kept prefix plus `marker` fits in `max_bytes`.
///
/// The cut lands on a grapheme cluster boundary, which is always a UTF-8
/// character boundary as well.
pub fn truncate_with_marker(text: String, max_bytes: usize, marker: &str) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }

    let budget = max_bytes.saturating_sub(marker.len());
    let mut cut = 0usize;
    for (idx, grapheme) in text.grapheme_indices(true) {
        let end = idx + grapheme.len();
        if end > budget {
            break;
        }
        cut = end;
    }

    let mut kept = String::with_capacity(cut + marker.len());
    kept.push_str(text[..cut].trim_end());
    kept.push_str(marker);
    (kept, true)
}

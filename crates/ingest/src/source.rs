//! Ticket sources.
//!
//! [`TicketSource`] is the narrow interface the pipeline uses to fetch tickets.
//! [`JsonDirTicketSource`] reads the on-disk export layout produced by the
//! tracker export tooling:
//!
//! ```text
//! <root>/
//! ├── GM-1042/
//! │   ├── ticket_data.json
//! │   └── attachments/...
//! └── GM-1043.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::TicketFetchError;
use crate::types::{AttachmentRef, Comment, IssueLink, LinkDirection, Ticket, TicketFields};

/// Fetches tickets from an issue tracker.
#[async_trait]
pub trait TicketSource: Send + Sync {
    async fn fetch_ticket(&self, id: &str) -> Result<Ticket, TicketFetchError>;
}

/// Normalize a user-supplied ticket key.
///
/// Bare numbers get the project prefix, and the prefix is upper-cased:
/// `"247999"` and `"gm-247999"` both become `"GM-247999"` for prefix `"GM"`.
pub fn normalize_ticket_key(prefix: &str, raw: &str) -> Result<String, TicketFetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TicketFetchError::InvalidId(raw.to_string()));
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("{}-{}", prefix.to_ascii_uppercase(), trimmed));
    }
    match trimmed.split_once('-') {
        Some((project, number))
            if !project.is_empty()
                && project.chars().all(|c| c.is_ascii_alphanumeric())
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit()) =>
        {
            Ok(format!("{}-{}", project.to_ascii_uppercase(), number))
        }
        _ => Err(TicketFetchError::InvalidId(raw.to_string())),
    }
}

/// Reads tickets from a directory of tracker exports.
#[derive(Debug, Clone)]
pub struct JsonDirTicketSource {
    root: PathBuf,
}

impl JsonDirTicketSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidate_paths(&self, id: &str) -> [PathBuf; 2] {
        [
            self.root.join(id).join("ticket_data.json"),
            self.root.join(format!("{id}.json")),
        ]
    }

    /// List ticket ids present under the root, sorted.
    pub async fn list_ids(&self) -> Result<Vec<String>, TicketFetchError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| TicketFetchError::Upstream(format!("{}: {e}", self.root.display())))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TicketFetchError::Upstream(e.to_string()))?
        {
            let path = entry.path();
            if path.is_dir() && path.join("ticket_data.json").is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|n| n.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl TicketSource for JsonDirTicketSource {
    async fn fetch_ticket(&self, id: &str) -> Result<Ticket, TicketFetchError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(TicketFetchError::InvalidId(id.to_string()));
        }

        for path in self.candidate_paths(id) {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(TicketFetchError::Upstream(format!(
                        "{}: {err}",
                        path.display()
                    )))
                }
            };
            debug!(ticket_id = id, path = %path.display(), "loaded ticket export");
            let export: TicketExport =
                serde_json::from_slice(&bytes).map_err(|e| TicketFetchError::Malformed {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(export.into_ticket(id));
        }

        Err(TicketFetchError::NotFound(id.to_string()))
    }
}

/// Parse tracker timestamps. Accepts RFC 3339 and the tracker's
/// `2024-01-15T10:30:00.000+0000` form.
pub fn parse_tracker_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct TicketExport {
    metadata: ExportMetadata,
    #[serde(default)]
    comments: Vec<ExportComment>,
    #[serde(default)]
    attachments: Vec<ExportAttachment>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportMetadata {
    key: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    status: Option<String>,
    status_category: Option<String>,
    resolution: Option<String>,
    priority: Option<String>,
    severity: Option<String>,
    created: Option<String>,
    updated: Option<String>,
    resolved: Option<String>,
    #[serde(default)]
    affects_versions: Vec<String>,
    #[serde(default)]
    fix_versions: Vec<String>,
    #[serde(default)]
    issue_links: Vec<ExportLink>,
}

#[derive(Debug, Deserialize)]
struct ExportLink {
    #[serde(rename = "type")]
    link_type: String,
    direction: LinkDirection,
    key: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportComment {
    #[serde(default)]
    body: String,
    author: Option<String>,
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportAttachment {
    filename: String,
    path: Option<String>,
    size: Option<u64>,
    mime_type: Option<String>,
}

impl TicketExport {
    fn into_ticket(self, requested_id: &str) -> Ticket {
        let meta = self.metadata;
        let timestamp = |raw: &Option<String>| raw.as_deref().and_then(parse_tracker_timestamp);

        let fields = TicketFields {
            status: meta.status.clone(),
            status_category: meta.status_category.clone(),
            priority: meta.priority.clone(),
            resolution: meta.resolution.clone(),
            severity: meta.severity.clone(),
            created_at: timestamp(&meta.created),
            updated_at: timestamp(&meta.updated),
            resolved_at: timestamp(&meta.resolved),
            affects_versions: meta.affects_versions,
            fix_versions: meta.fix_versions,
        };

        let comments = self
            .comments
            .into_iter()
            .map(|c| Comment {
                created_at: c.created.as_deref().and_then(parse_tracker_timestamp),
                author: c.author,
                body: c.body,
            })
            .collect();

        let attachments = self
            .attachments
            .into_iter()
            .enumerate()
            .map(|(idx, a)| AttachmentRef {
                id: format!("{requested_id}#{idx}"),
                filename: a.filename,
                mime_type: a.mime_type,
                size: a.size,
                location: a.path,
            })
            .collect();

        let links = meta
            .issue_links
            .into_iter()
            .filter_map(|l| {
                Some(IssueLink {
                    key: l.key?,
                    link_type: l.link_type,
                    direction: l.direction,
                    summary: l.summary,
                })
            })
            .collect();

        Ticket {
            id: meta.key.unwrap_or_else(|| requested_id.to_string()),
            title: meta.summary.unwrap_or_default(),
            body: meta.description.unwrap_or_default(),
            fields,
            comments,
            attachments,
            links,
        }
    }
}

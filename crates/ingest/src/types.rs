//! Core data model for tickets as they arrive from the issue tracker.
//!
//! A [`Ticket`] is immutable once fetched for a processing run. Every call to
//! the pipeline fetches it fresh from the [`TicketSource`](crate::TicketSource).
//!
//! # Type Hierarchy
//!
//! ```text
//! Ticket
//! ├── id: String
//! ├── title: String
//! ├── body: String
//! ├── fields: TicketFields
//! │   ├── status / status_category / priority / resolution / severity
//! │   ├── created_at / updated_at / resolved_at
//! │   └── affects_versions / fix_versions
//! ├── comments: Vec<Comment>
//! ├── attachments: Vec<AttachmentRef>
//! └── links: Vec<IssueLink>
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single issue-tracker ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Tracker key, e.g. `GM-1042`. Unique across the corpus.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub fields: TicketFields,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub links: Vec<IssueLink>,
}

impl Ticket {
    /// Create a ticket with only the identifying text set.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            fields: TicketFields::default(),
            comments: Vec::new(),
            attachments: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: TicketFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_comment(mut self, comment: Comment) -> Self {
        self.comments.push(comment);
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Structured tracker fields. Everything is optional because tracker exports
/// routinely leave fields unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketFields {
    pub status: Option<String>,
    pub status_category: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub severity: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub affects_versions: Vec<String>,
    #[serde(default)]
    pub fix_versions: Vec<String>,
}

/// A ticket comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    pub body: String,
}

impl Comment {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            author: None,
            created_at: None,
            body: body.into(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Reference to an attachment. The bytes live elsewhere; extraction of text
/// (OCR, captions) is the job of an [`AttachmentExtractor`](crate::AttachmentExtractor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// Where the attachment can be found (local path or URL).
    #[serde(default)]
    pub location: Option<String>,
}

impl AttachmentRef {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            mime_type: None,
            size: None,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Inward,
    Outward,
}

/// A typed link to another ticket ("duplicates", "relates to", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLink {
    pub link_type: String,
    pub direction: LinkDirection,
    pub key: String,
    #[serde(default)]
    pub summary: Option<String>,
}

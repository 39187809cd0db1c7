//! Error types produced by the collaborators in this crate.
//!
//! | Error | Fatal to the pipeline? |
//! |-------|------------------------|
//! | [`TicketFetchError::NotFound`] | yes, reported to the caller |
//! | [`TicketFetchError::Upstream`] | yes, caller may retry later |
//! | [`ExtractError`] | no, attachment text is best-effort |

use thiserror::Error;

/// Failure to fetch a ticket from the issue tracker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketFetchError {
    #[error("ticket `{0}` not found")]
    NotFound(String),
    #[error("invalid ticket id `{0}`")]
    InvalidId(String),
    #[error("issue tracker unavailable: {0}")]
    Upstream(String),
    #[error("malformed ticket data for `{id}`: {reason}")]
    Malformed { id: String, reason: String },
}

impl TicketFetchError {
    /// Whether a later retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TicketFetchError::Upstream(_))
    }
}

/// Failure to extract text from an attachment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("attachment `{0}` is unavailable")]
    Unavailable(String),
    #[error("unsupported attachment type `{0}`")]
    Unsupported(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

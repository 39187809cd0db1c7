use thiserror::Error;

/// Errors that can occur while consolidating a ticket.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("consolidated document requires a non-empty ticket id")]
    MissingTicketId,
    #[error("ticket `{0}` has no textual content")]
    EmptyDocument(String),
}

//! Ticket ingest layer
//!
//! This is where tickets enter the duplicate-detection pipeline. The crate
//! owns the ticket data model and the two narrow collaborator interfaces the
//! pipeline consumes:
//!
//! - [`TicketSource`] fetches a [`Ticket`] by id. Failures are typed as
//!   [`TicketFetchError`] so the caller can tell "not found" from "tracker down".
//! - [`AttachmentExtractor`] turns an [`AttachmentRef`] into text. Extraction
//!   is best-effort; failures never abort a pipeline run.
//!
//! Reference implementations read the tracker export layout from disk
//! ([`JsonDirTicketSource`]) and pick up OCR output written as sidecar files
//! ([`SidecarTextExtractor`]).
//!
//! ## Example
//!
//! ```no_run
//! use ingest::{JsonDirTicketSource, TicketSource};
//!
//! # async fn run() -> Result<(), ingest::TicketFetchError> {
//! let source = JsonDirTicketSource::new("jira_tickets_data");
//! let ticket = source.fetch_ticket("GM-1042").await?;
//! println!("{}: {}", ticket.id, ticket.title);
//! # Ok(())
//! # }
//! ```

mod error;
mod extract;
mod source;
mod types;

pub use crate::error::{ExtractError, TicketFetchError};
pub use crate::extract::{AttachmentExtractor, NoopExtractor, SidecarTextExtractor};
pub use crate::source::{
    normalize_ticket_key, parse_tracker_timestamp, JsonDirTicketSource, TicketSource,
};
pub use crate::types::{
    AttachmentRef, Comment, IssueLink, LinkDirection, Ticket, TicketFields,
};

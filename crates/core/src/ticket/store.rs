//! Ticket storage trait and types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ticket::{Ticket, TicketStatus};

/// Error type for ticket operations.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Duplicate redemption token")]
    DuplicateToken,

    #[error("Database error: {0}")]
    Database(String),
}

/// Request to create a new ticket row.
///
/// The issuance workflow owns QR rendering and delivery; this is only the
/// persisted row it hands to the redemption side.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    /// Human-facing serial.
    pub serial: String,
    /// Redemption token to embed in the QR code. Must be unique.
    pub qr_token: String,
    /// Token-format version for this ticket.
    pub qr_version: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub event_id: Option<String>,
    pub ticket_type_id: Option<String>,
    pub holder_name: Option<String>,
}

/// Filter for querying tickets.
#[derive(Debug, Clone)]
pub struct TicketFilter {
    /// Filter by stored status.
    pub status: Option<TicketStatus>,
    /// Filter by owning event.
    pub event_id: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            event_id: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by status.
    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by event.
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Outcome of the conditional consume update.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// The conditional update won: this call transitioned ISSUED -> USED.
    /// Carries the freshly read row with `used_at` fixed.
    Consumed(Ticket),
    /// The conditional update affected zero rows: the ticket was no longer
    /// ISSUED. Carries the fresh row so the caller can reclassify.
    Conflict(Ticket),
}

/// Trait for ticket storage backends.
pub trait TicketStore: Send + Sync {
    /// Create a new ticket in status ISSUED.
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    /// Get a ticket by its redemption token.
    fn find_by_token(&self, qr_token: &str) -> Result<Option<Ticket>, TicketError>;

    /// Atomically consume a ticket: a conditional update that transitions
    /// ISSUED -> USED and stamps `used_at = at`, succeeding only if the row
    /// still reads ISSUED. This is the sole at-most-once guarantee under
    /// concurrent scans.
    fn consume(&self, id: &str, at: DateTime<Utc>) -> Result<ConsumeOutcome, TicketError>;

    /// Set a ticket's status directly. Backs administrative revoke/refund
    /// flows; the redemption path never calls this.
    fn update_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, TicketError>;

    /// List tickets matching the filter.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError>;

    /// Count tickets matching the filter.
    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError>;
}

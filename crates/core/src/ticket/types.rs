//! Core ticket data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored ticket status.
///
/// Expiry is derived from `expires_at` at evaluation time and never stored,
/// so an expired-but-unscanned ticket still reads `Issued` here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Issued and not yet redeemed.
    Issued,
    /// Redeemed at admission. Terminal.
    Used,
    /// Administratively revoked. Terminal.
    Revoked,
    /// Refunded through the payment flow. Terminal.
    Refunded,
}

impl TicketStatus {
    /// Returns the status as its storage/wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Issued => "ISSUED",
            TicketStatus::Used => "USED",
            TicketStatus::Revoked => "REVOKED",
            TicketStatus::Refunded => "REFUNDED",
        }
    }

    /// Parse a storage string back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ISSUED" => Some(TicketStatus::Issued),
            "USED" => Some(TicketStatus::Used),
            "REVOKED" => Some(TicketStatus::Revoked),
            "REFUNDED" => Some(TicketStatus::Refunded),
            _ => None,
        }
    }
}

/// A ticket row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Unique identifier (UUID).
    pub id: String,
    /// Human-facing serial printed on the ticket.
    pub serial: String,
    pub status: TicketStatus,
    /// Opaque redemption token embedded in the QR code. Unique.
    pub qr_token: String,
    /// Token-format version; payloads claiming a different version are
    /// rejected, which invalidates stale or reissued QR images.
    pub qr_version: i64,
    pub issued_at: DateTime<Utc>,
    /// Set exactly once, when the ticket is consumed.
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Owning event, if the issuance workflow recorded one.
    pub event_id: Option<String>,
    pub ticket_type_id: Option<String>,
    pub holder_name: Option<String>,
}

impl Ticket {
    /// True when `expires_at` is set and not after `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Read-only projection of a ticket safe for API responses.
///
/// Carries no redemption token, so a response can never be replayed
/// as a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketView {
    pub id: String,
    pub serial: String,
    pub status: TicketStatus,
    pub qr_version: i64,
    pub issued_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub event_id: Option<String>,
    pub ticket_type_id: Option<String>,
    pub holder_name: Option<String>,
}

impl From<&Ticket> for TicketView {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id.clone(),
            serial: ticket.serial.clone(),
            status: ticket.status,
            qr_version: ticket.qr_version,
            issued_at: ticket.issued_at,
            used_at: ticket.used_at,
            expires_at: ticket.expires_at,
            event_id: ticket.event_id.clone(),
            ticket_type_id: ticket.ticket_type_id.clone(),
            holder_name: ticket.holder_name.clone(),
        }
    }
}

impl From<Ticket> for TicketView {
    fn from(ticket: Ticket) -> Self {
        Self::from(&ticket)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single scan attempt, as recorded in the log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanOutcome {
    /// The scan consumed the ticket.
    Valid,
    AlreadyUsed,
    Invalid,
    Expired,
    Revoked,
}

impl ScanOutcome {
    /// Returns the outcome as its storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Valid => "VALID",
            ScanOutcome::AlreadyUsed => "ALREADY_USED",
            ScanOutcome::Invalid => "INVALID",
            ScanOutcome::Expired => "EXPIRED",
            ScanOutcome::Revoked => "REVOKED",
        }
    }

    /// Parse a storage string back into an outcome.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VALID" => Some(ScanOutcome::Valid),
            "ALREADY_USED" => Some(ScanOutcome::AlreadyUsed),
            "INVALID" => Some(ScanOutcome::Invalid),
            "EXPIRED" => Some(ScanOutcome::Expired),
            "REVOKED" => Some(ScanOutcome::Revoked),
            _ => None,
        }
    }
}

/// Optional request context captured for audit only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// A scan attempt to append to the log.
#[derive(Debug, Clone)]
pub struct NewScanRecord {
    /// Null when the scanned text never resolved to a ticket.
    pub ticket_id: Option<String>,
    pub scanner_id: String,
    pub outcome: ScanOutcome,
    pub scanned_at: DateTime<Utc>,
    pub metadata: ScanMetadata,
}

/// A stored scan record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    pub ticket_id: Option<String>,
    pub scanner_id: String,
    pub outcome: ScanOutcome,
    pub scanned_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

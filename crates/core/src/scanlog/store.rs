use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{NewScanRecord, ScanOutcome, ScanRecord};

#[derive(Debug, Error)]
pub enum ScanLogError {
    #[error("Database error: {0}")]
    Database(String),
}

/// Filter for querying scan records
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub ticket_id: Option<String>,
    pub scanner_id: Option<String>,
    pub outcome: Option<ScanOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_ticket_id(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_scanner_id(mut self, scanner_id: impl Into<String>) -> Self {
        self.scanner_id = Some(scanner_id.into());
        self
    }

    pub fn with_outcome(mut self, outcome: ScanOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for append-only scan log storage
pub trait ScanLogStore: Send + Sync {
    /// Append a scan record, returns the assigned ID
    fn insert(&self, record: &NewScanRecord) -> Result<i64, ScanLogError>;

    /// Query scan records with optional filters
    fn query(&self, filter: &ScanFilter) -> Result<Vec<ScanRecord>, ScanLogError>;

    /// Count matching scan records
    fn count(&self, filter: &ScanFilter) -> Result<i64, ScanLogError>;
}

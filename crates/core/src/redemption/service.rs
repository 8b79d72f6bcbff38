//! Ticket redemption: decide admission validity and consume exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::SCAN_DECISIONS;
use crate::scanlog::{NewScanRecord, ScanLogStore, ScanMetadata, ScanOutcome};
use crate::ticket::{ConsumeOutcome, Ticket, TicketError, TicketStatus, TicketStore, TicketView};

use super::payload::{parse_payload, QrPayload};

/// Error type for redemption calls.
///
/// Only caller mistakes and data-store failures surface here; decode
/// failures, unknown tickets and ineligible states are normal outcomes
/// carried by [`RedemptionResult`].
#[derive(Debug, Error)]
pub enum RedemptionError {
    /// The scanning actor is required before any lookup happens.
    #[error("scanner_id is required")]
    MissingScannerId,

    /// Nothing was scanned; not counted as a scan attempt.
    #[error("scanned text is empty")]
    EmptyScannedText,

    /// Data-store failure. Transient and retryable, never conflated with
    /// an invalid ticket.
    #[error("ticket store failure: {0}")]
    Store(#[from] TicketError),
}

/// Decision returned to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    /// The ticket was eligible and this call consumed it.
    ValidUnused,
    AlreadyUsed,
    Invalid,
    Expired,
    Revoked,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::ValidUnused => "valid_unused",
            RedemptionStatus::AlreadyUsed => "already_used",
            RedemptionStatus::Invalid => "invalid",
            RedemptionStatus::Expired => "expired",
            RedemptionStatus::Revoked => "revoked",
        }
    }

    /// The scan-log outcome recorded for this decision.
    fn scan_outcome(&self) -> ScanOutcome {
        match self {
            RedemptionStatus::ValidUnused => ScanOutcome::Valid,
            RedemptionStatus::AlreadyUsed => ScanOutcome::AlreadyUsed,
            RedemptionStatus::Invalid => ScanOutcome::Invalid,
            RedemptionStatus::Expired => ScanOutcome::Expired,
            RedemptionStatus::Revoked => ScanOutcome::Revoked,
        }
    }
}

/// A scan request from an authenticated scanner.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Raw text decoded from the QR code.
    pub scanned_text: String,
    /// Authenticated device/operator identity.
    pub scanner_id: String,
    /// Audit-only request context.
    pub metadata: ScanMetadata,
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedemptionResult {
    pub status: RedemptionStatus,
    /// Sanitized projection, present when the ticket was identified.
    pub ticket: Option<TicketView>,
}

impl RedemptionResult {
    fn status_only(status: RedemptionStatus) -> Self {
        Self {
            status,
            ticket: None,
        }
    }

    fn with_ticket(status: RedemptionStatus, ticket: &Ticket) -> Self {
        Self {
            status,
            ticket: Some(TicketView::from(ticket)),
        }
    }
}

/// The redemption service.
///
/// Stateless between calls; safe under arbitrary parallel invocation
/// because at-most-once consumption rests entirely on the store's
/// conditional update, not on anything held here.
pub struct RedemptionService {
    tickets: Arc<dyn TicketStore>,
    scan_log: Arc<dyn ScanLogStore>,
    signing_secret: Option<String>,
}

impl RedemptionService {
    pub fn new(tickets: Arc<dyn TicketStore>, scan_log: Arc<dyn ScanLogStore>) -> Self {
        Self {
            tickets,
            scan_log,
            signing_secret: None,
        }
    }

    /// Enable signed QR payloads.
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    /// Redeem the ticket identified by `scanned_text`, consuming it when
    /// eligible. Every attempt that reaches ticket lookup appends exactly
    /// one scan record, including failed ones.
    pub fn redeem(&self, request: &ScanRequest) -> Result<RedemptionResult, RedemptionError> {
        if request.scanner_id.trim().is_empty() {
            return Err(RedemptionError::MissingScannerId);
        }
        if request.scanned_text.trim().is_empty() {
            return Err(RedemptionError::EmptyScannedText);
        }

        let now = Utc::now();

        let payload = match parse_payload(&request.scanned_text, self.signing_secret.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("QR payload rejected: {}", e);
                return Ok(self.decide(request, now, RedemptionStatus::Invalid, None));
            }
        };

        let ticket = match &payload {
            QrPayload::Opaque { token, .. } => self.tickets.find_by_token(token)?,
            QrPayload::Signed { ticket_id, .. } => self.tickets.get(ticket_id)?,
        };

        let Some(ticket) = ticket else {
            return Ok(self.decide(request, now, RedemptionStatus::Invalid, None));
        };

        // A stale version claim means the QR image predates a reissue. The
        // scan is logged against the identified ticket, but the response
        // stays bare so the payload can't be used to probe ticket data.
        if payload
            .version_claim()
            .is_some_and(|v| v != ticket.qr_version)
        {
            self.log_scan(request, now, Some(ticket.id.as_str()), ScanOutcome::Invalid);
            SCAN_DECISIONS
                .with_label_values(&[RedemptionStatus::Invalid.as_str()])
                .inc();
            return Ok(RedemptionResult::status_only(RedemptionStatus::Invalid));
        }

        // Fast path: classify against the pre-read row. The conditional
        // update below remains the sole consumption authority.
        if let Some(status) = classify_ineligible(&ticket, now) {
            return Ok(self.decide(request, now, status, Some(&ticket)));
        }

        match self.tickets.consume(&ticket.id, now)? {
            ConsumeOutcome::Consumed(fresh) => {
                crate::metrics::TICKETS_CONSUMED_TOTAL.inc();
                Ok(self.decide(request, now, RedemptionStatus::ValidUnused, Some(&fresh)))
            }
            ConsumeOutcome::Conflict(fresh) => {
                // A concurrent scan won between the pre-read and the update.
                // Reclassify against the fresh row; the common race lands on
                // AlreadyUsed.
                let status =
                    classify_ineligible(&fresh, now).unwrap_or(RedemptionStatus::Invalid);
                Ok(self.decide(request, now, status, Some(&fresh)))
            }
        }
    }

    /// Record the decision, count it, and build the result.
    fn decide(
        &self,
        request: &ScanRequest,
        now: DateTime<Utc>,
        status: RedemptionStatus,
        ticket: Option<&Ticket>,
    ) -> RedemptionResult {
        self.log_scan(request, now, ticket.map(|t| t.id.as_str()), status.scan_outcome());
        SCAN_DECISIONS.with_label_values(&[status.as_str()]).inc();
        match ticket {
            Some(ticket) => RedemptionResult::with_ticket(status, ticket),
            None => RedemptionResult::status_only(status),
        }
    }

    /// Append a scan record. Best-effort: a failing log write is reported
    /// at warn level and must never overturn the redemption decision.
    fn log_scan(
        &self,
        request: &ScanRequest,
        now: DateTime<Utc>,
        ticket_id: Option<&str>,
        outcome: ScanOutcome,
    ) {
        let record = NewScanRecord {
            ticket_id: ticket_id.map(String::from),
            scanner_id: request.scanner_id.clone(),
            outcome,
            scanned_at: now,
            metadata: request.metadata.clone(),
        };
        if let Err(e) = self.scan_log.insert(&record) {
            tracing::warn!("Failed to record scan attempt: {}", e);
        }
    }
}

/// Evaluate the admission guards against a ticket row.
///
/// Returns `None` when the row is eligible for consumption (ISSUED and not
/// expired). Terminal statuses win over expiry: a ticket that was consumed
/// and later passed its expiry still reads AlreadyUsed.
fn classify_ineligible(ticket: &Ticket, now: DateTime<Utc>) -> Option<RedemptionStatus> {
    match ticket.status {
        TicketStatus::Used => Some(RedemptionStatus::AlreadyUsed),
        _ if ticket.is_expired_at(now) => Some(RedemptionStatus::Expired),
        TicketStatus::Revoked | TicketStatus::Refunded => Some(RedemptionStatus::Revoked),
        TicketStatus::Issued => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redemption::payload::{encode_opaque, encode_signed};
    use crate::scanlog::{ScanFilter, ScanLogError, SqliteScanLog};
    use crate::ticket::{CreateTicketRequest, SqliteTicketStore};
    use chrono::Duration;

    const SECRET: &str = "test-signing-secret";

    struct Fixture {
        tickets: Arc<SqliteTicketStore>,
        scan_log: Arc<SqliteScanLog>,
        service: RedemptionService,
    }

    fn fixture() -> Fixture {
        let tickets = Arc::new(SqliteTicketStore::in_memory().unwrap());
        let scan_log = Arc::new(SqliteScanLog::in_memory().unwrap());
        let service = RedemptionService::new(
            Arc::clone(&tickets) as Arc<dyn TicketStore>,
            Arc::clone(&scan_log) as Arc<dyn ScanLogStore>,
        )
        .with_signing_secret(SECRET);
        Fixture {
            tickets,
            scan_log,
            service,
        }
    }

    fn issue(fixture: &Fixture, token: &str) -> Ticket {
        issue_with(fixture, token, 1, None)
    }

    fn issue_with(
        fixture: &Fixture,
        token: &str,
        version: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Ticket {
        fixture
            .tickets
            .create(CreateTicketRequest {
                serial: format!("TKT-{}", token),
                qr_token: token.to_string(),
                qr_version: version,
                expires_at,
                event_id: Some("ev-1".to_string()),
                ticket_type_id: None,
                holder_name: None,
            })
            .unwrap()
    }

    fn scan(text: &str, scanner: &str) -> ScanRequest {
        ScanRequest {
            scanned_text: text.to_string(),
            scanner_id: scanner.to_string(),
            metadata: ScanMetadata::default(),
        }
    }

    #[test]
    fn test_first_scan_consumes() {
        let f = fixture();
        let ticket = issue(&f, "abc123");

        let result = f.service.redeem(&scan("abc123", "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::ValidUnused);
        let view = result.ticket.unwrap();
        assert_eq!(view.id, ticket.id);
        assert_eq!(view.status, TicketStatus::Used);
        assert!(view.used_at.is_some());
    }

    #[test]
    fn test_second_scan_already_used_with_same_used_at() {
        let f = fixture();
        issue(&f, "abc123");

        let first = f.service.redeem(&scan("abc123", "scanner-1")).unwrap();
        let first_used_at = first.ticket.unwrap().used_at.unwrap();

        let second = f.service.redeem(&scan("abc123", "scanner-2")).unwrap();
        assert_eq!(second.status, RedemptionStatus::AlreadyUsed);
        assert_eq!(second.ticket.unwrap().used_at.unwrap(), first_used_at);
    }

    #[test]
    fn test_unknown_token_invalid_with_null_ticket_record() {
        let f = fixture();

        let result = f.service.redeem(&scan("no-such-token", "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::Invalid);
        assert!(result.ticket.is_none());

        let records = f.scan_log.query(&ScanFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].ticket_id.is_none());
        assert_eq!(records[0].outcome, ScanOutcome::Invalid);
        assert_eq!(records[0].scanner_id, "scanner-1");
    }

    #[test]
    fn test_garbled_envelope_invalid_and_logged() {
        let f = fixture();

        let result = f.service.redeem(&scan("TKT:nope:", "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::Invalid);
        assert!(result.ticket.is_none());
        assert_eq!(f.scan_log.count(&ScanFilter::new()).unwrap(), 1);
    }

    #[test]
    fn test_expired_ticket() {
        let f = fixture();
        let expired_at = Utc::now() - Duration::minutes(5);
        issue_with(&f, "tok-exp", 1, Some(expired_at));

        let result = f.service.redeem(&scan("tok-exp", "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::Expired);
        // The row is untouched
        let view = result.ticket.unwrap();
        assert_eq!(view.status, TicketStatus::Issued);
        assert!(view.used_at.is_none());

        let records = f.scan_log.query(&ScanFilter::new()).unwrap();
        assert_eq!(records[0].outcome, ScanOutcome::Expired);
    }

    #[test]
    fn test_revoked_ticket_idempotent() {
        let f = fixture();
        let ticket = issue(&f, "tok-rev");
        f.tickets
            .update_status(&ticket.id, TicketStatus::Revoked)
            .unwrap();

        for _ in 0..3 {
            let result = f.service.redeem(&scan("tok-rev", "scanner-1")).unwrap();
            assert_eq!(result.status, RedemptionStatus::Revoked);
        }

        let fresh = f.tickets.get(&ticket.id).unwrap().unwrap();
        assert_eq!(fresh.status, TicketStatus::Revoked);
        assert!(fresh.used_at.is_none());
    }

    #[test]
    fn test_refunded_ticket_reports_revoked() {
        let f = fixture();
        let ticket = issue(&f, "tok-ref");
        f.tickets
            .update_status(&ticket.id, TicketStatus::Refunded)
            .unwrap();

        let result = f.service.redeem(&scan("tok-ref", "scanner-1")).unwrap();
        assert_eq!(result.status, RedemptionStatus::Revoked);

        let records = f.scan_log.query(&ScanFilter::new()).unwrap();
        assert_eq!(records[0].outcome, ScanOutcome::Revoked);
    }

    #[test]
    fn test_used_wins_over_expiry() {
        let f = fixture();
        // Expires shortly; consume first, then scan again after expiry.
        let ticket = issue_with(&f, "tok-1", 1, Some(Utc::now() + Duration::milliseconds(50)));

        let first = f.service.redeem(&scan("tok-1", "scanner-1")).unwrap();
        assert_eq!(first.status, RedemptionStatus::ValidUnused);

        std::thread::sleep(std::time::Duration::from_millis(60));
        let fresh = f.tickets.get(&ticket.id).unwrap().unwrap();
        assert!(fresh.is_expired_at(Utc::now()));

        let second = f.service.redeem(&scan("tok-1", "scanner-1")).unwrap();
        assert_eq!(second.status, RedemptionStatus::AlreadyUsed);
    }

    #[test]
    fn test_version_mismatch_invalid() {
        let f = fixture();
        let ticket = issue_with(&f, "tok-v2", 2, None);

        // Envelope claims version 1, stored version is 2.
        let result = f
            .service
            .redeem(&scan(&encode_opaque("tok-v2", 1), "scanner-1"))
            .unwrap();

        assert_eq!(result.status, RedemptionStatus::Invalid);
        assert!(result.ticket.is_none());

        // Logged against the identified ticket
        let records = f.scan_log.query(&ScanFilter::new()).unwrap();
        assert_eq!(records[0].ticket_id.as_deref(), Some(ticket.id.as_str()));
        assert_eq!(records[0].outcome, ScanOutcome::Invalid);
    }

    #[test]
    fn test_matching_version_claim_accepted() {
        let f = fixture();
        issue_with(&f, "tok-v2", 2, None);

        let result = f
            .service
            .redeem(&scan(&encode_opaque("tok-v2", 2), "scanner-1"))
            .unwrap();
        assert_eq!(result.status, RedemptionStatus::ValidUnused);
    }

    #[test]
    fn test_signed_payload_redeems() {
        let f = fixture();
        let ticket = issue(&f, "tok-signed");

        let text = encode_signed(SECRET, &ticket.id, 1);
        let result = f.service.redeem(&scan(&text, "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::ValidUnused);
        assert_eq!(result.ticket.unwrap().id, ticket.id);
    }

    #[test]
    fn test_signed_payload_stale_version_invalid() {
        let f = fixture();
        let ticket = issue_with(&f, "tok-signed", 2, None);

        // Signature is valid for version 1, but the ticket was reissued at 2.
        let text = encode_signed(SECRET, &ticket.id, 1);
        let result = f.service.redeem(&scan(&text, "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::Invalid);
    }

    #[test]
    fn test_tampered_signature_invalid_with_null_ticket() {
        let f = fixture();
        let ticket = issue(&f, "tok-signed");

        let text = encode_signed(SECRET, &ticket.id, 1);
        let tampered = format!("{}ff", text);
        let result = f.service.redeem(&scan(&tampered, "scanner-1")).unwrap();

        assert_eq!(result.status, RedemptionStatus::Invalid);
        let records = f.scan_log.query(&ScanFilter::new()).unwrap();
        assert!(records[0].ticket_id.is_none());
    }

    #[test]
    fn test_missing_scanner_id_rejected_without_scan_record() {
        let f = fixture();
        issue(&f, "abc123");

        let result = f.service.redeem(&scan("abc123", "  "));
        assert!(matches!(result, Err(RedemptionError::MissingScannerId)));

        assert_eq!(f.scan_log.count(&ScanFilter::new()).unwrap(), 0);
    }

    #[test]
    fn test_empty_scanned_text_rejected_without_scan_record() {
        let f = fixture();

        let result = f.service.redeem(&scan("", "scanner-1"));
        assert!(matches!(result, Err(RedemptionError::EmptyScannedText)));

        assert_eq!(f.scan_log.count(&ScanFilter::new()).unwrap(), 0);
    }

    #[test]
    fn test_every_attempt_logged_exactly_once() {
        let f = fixture();
        issue(&f, "abc123");

        f.service.redeem(&scan("abc123", "scanner-1")).unwrap();
        f.service.redeem(&scan("abc123", "scanner-2")).unwrap();
        f.service.redeem(&scan("garbage", "scanner-3")).unwrap();

        assert_eq!(f.scan_log.count(&ScanFilter::new()).unwrap(), 3);
        assert_eq!(
            f.scan_log
                .count(&ScanFilter::new().with_outcome(ScanOutcome::Valid))
                .unwrap(),
            1
        );
        assert_eq!(
            f.scan_log
                .count(&ScanFilter::new().with_outcome(ScanOutcome::AlreadyUsed))
                .unwrap(),
            1
        );
        assert_eq!(
            f.scan_log
                .count(&ScanFilter::new().with_outcome(ScanOutcome::Invalid))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_metadata_captured_on_record() {
        let f = fixture();
        issue(&f, "abc123");

        let request = ScanRequest {
            scanned_text: "abc123".to_string(),
            scanner_id: "gate-7".to_string(),
            metadata: ScanMetadata {
                user_agent: Some("ScannerApp/2.1".to_string()),
                ip_address: Some("10.1.2.3".to_string()),
            },
        };
        f.service.redeem(&request).unwrap();

        let records = f.scan_log.query(&ScanFilter::new()).unwrap();
        assert_eq!(records[0].scanner_id, "gate-7");
        assert_eq!(records[0].user_agent.as_deref(), Some("ScannerApp/2.1"));
        assert_eq!(records[0].ip_address.as_deref(), Some("10.1.2.3"));
    }

    /// Scan log that always fails, to prove log errors never change the decision.
    struct FailingScanLog;

    impl ScanLogStore for FailingScanLog {
        fn insert(&self, _record: &NewScanRecord) -> Result<i64, ScanLogError> {
            Err(ScanLogError::Database("disk full".to_string()))
        }

        fn query(&self, _filter: &ScanFilter) -> Result<Vec<crate::scanlog::ScanRecord>, ScanLogError> {
            Ok(vec![])
        }

        fn count(&self, _filter: &ScanFilter) -> Result<i64, ScanLogError> {
            Ok(0)
        }
    }

    #[test]
    fn test_log_failure_never_blocks_redemption() {
        let tickets = Arc::new(SqliteTicketStore::in_memory().unwrap());
        let service = RedemptionService::new(
            Arc::clone(&tickets) as Arc<dyn TicketStore>,
            Arc::new(FailingScanLog),
        );

        tickets
            .create(CreateTicketRequest {
                serial: "TKT-1".to_string(),
                qr_token: "abc123".to_string(),
                qr_version: 1,
                expires_at: None,
                event_id: None,
                ticket_type_id: None,
                holder_name: None,
            })
            .unwrap();

        let result = service.redeem(&scan("abc123", "scanner-1")).unwrap();
        assert_eq!(result.status, RedemptionStatus::ValidUnused);

        let result = service.redeem(&scan("abc123", "scanner-1")).unwrap();
        assert_eq!(result.status, RedemptionStatus::AlreadyUsed);
    }

    #[test]
    fn test_concurrent_scans_consume_exactly_once() {
        let f = fixture();
        issue(&f, "race-token");

        let service = Arc::new(f.service);
        let mut handles = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            handles.push(std::thread::spawn(move || {
                service
                    .redeem(&scan("race-token", &format!("scanner-{}", i)))
                    .unwrap()
                    .status
            }));
        }

        let mut valid = 0;
        let mut already_used = 0;
        for handle in handles {
            match handle.join().unwrap() {
                RedemptionStatus::ValidUnused => valid += 1,
                RedemptionStatus::AlreadyUsed => already_used += 1,
                other => panic!("unexpected status under race: {:?}", other),
            }
        }

        assert_eq!(valid, 1);
        assert_eq!(already_used, 7);

        // Exactly one VALID scan record among the eight
        assert_eq!(
            f.scan_log
                .count(&ScanFilter::new().with_outcome(ScanOutcome::Valid))
                .unwrap(),
            1
        );
        assert_eq!(f.scan_log.count(&ScanFilter::new()).unwrap(), 8);
    }

    #[test]
    fn test_classify_guard_order() {
        let now = Utc::now();
        let mut ticket = Ticket {
            id: "t-1".to_string(),
            serial: "TKT-1".to_string(),
            status: TicketStatus::Issued,
            qr_token: "tok".to_string(),
            qr_version: 1,
            issued_at: now,
            used_at: None,
            expires_at: None,
            event_id: None,
            ticket_type_id: None,
            holder_name: None,
        };

        assert_eq!(classify_ineligible(&ticket, now), None);

        ticket.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(
            classify_ineligible(&ticket, now),
            Some(RedemptionStatus::Expired)
        );

        // Expiry wins over revocation while the row was never consumed
        ticket.status = TicketStatus::Revoked;
        assert_eq!(
            classify_ineligible(&ticket, now),
            Some(RedemptionStatus::Expired)
        );

        ticket.expires_at = None;
        assert_eq!(
            classify_ineligible(&ticket, now),
            Some(RedemptionStatus::Revoked)
        );

        ticket.status = TicketStatus::Refunded;
        assert_eq!(
            classify_ineligible(&ticket, now),
            Some(RedemptionStatus::Revoked)
        );

        // A consumed ticket stays AlreadyUsed even past its expiry
        ticket.status = TicketStatus::Used;
        ticket.used_at = Some(now);
        ticket.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(
            classify_ineligible(&ticket, now),
            Some(RedemptionStatus::AlreadyUsed)
        );
    }
}

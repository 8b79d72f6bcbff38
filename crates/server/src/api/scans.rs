//! Scan log query API.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turnstile_core::{ScanFilter, ScanOutcome, ScanRecord};

use crate::state::AppState;

/// Maximum allowed limit for scan log queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for scan log queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the scan log endpoint
#[derive(Debug, Deserialize)]
pub struct ScanQueryParams {
    /// Filter by ticket ID
    pub ticket_id: Option<String>,
    /// Filter by scanner identity
    pub scanner_id: Option<String>,
    /// Filter by outcome (VALID, ALREADY_USED, INVALID, EXPIRED, REVOKED)
    pub outcome: Option<String>,
    /// Filter records after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter records before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for scan log queries
#[derive(Debug, Serialize)]
pub struct ScanQueryResponse {
    /// Matching scan records
    pub scans: Vec<ScanRecord>,
    /// Total number of matching records
    pub total: i64,
    /// Limit used for this query
    pub limit: i64,
    /// Offset used for this query
    pub offset: i64,
}

/// Error response for scan log queries
#[derive(Debug, Serialize)]
pub struct ScanQueryErrorResponse {
    pub error: String,
}

/// Query scan records
pub async fn query_scans(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScanQueryParams>,
) -> Result<Json<ScanQueryResponse>, impl IntoResponse> {
    // Validate and cap limit
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    // Build base filter (shared between query and count)
    let mut base_filter = ScanFilter::new();

    if let Some(ref ticket_id) = params.ticket_id {
        base_filter = base_filter.with_ticket_id(ticket_id);
    }

    if let Some(ref scanner_id) = params.scanner_id {
        base_filter = base_filter.with_scanner_id(scanner_id);
    }

    if let Some(ref outcome_str) = params.outcome {
        let Some(outcome) = ScanOutcome::parse(outcome_str) else {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ScanQueryErrorResponse {
                    error: format!("Unknown scan outcome: {}", outcome_str),
                }),
            ));
        };
        base_filter = base_filter.with_outcome(outcome);
    }

    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    // Create query filter with pagination
    let query_filter = ScanFilter {
        limit,
        offset,
        ..base_filter.clone()
    };

    // Query records
    let scans = match state.scan_log().query(&query_filter) {
        Ok(scans) => scans,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ScanQueryErrorResponse {
                    error: format!("Failed to query scan log: {}", e),
                }),
            ));
        }
    };

    // Get total count (without limit/offset) using the base filter
    let total = match state.scan_log().count(&base_filter) {
        Ok(count) => count,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ScanQueryErrorResponse {
                    error: format!("Failed to count scan log: {}", e),
                }),
            ));
        }
    };

    Ok(Json(ScanQueryResponse {
        scans,
        total,
        limit,
        offset,
    }))
}

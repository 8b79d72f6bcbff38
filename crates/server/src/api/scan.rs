//! Scan API handler.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use turnstile_core::{
    RedemptionError, RedemptionResult, RedemptionStatus, ScanMetadata, ScanRequest, TicketView,
};

use super::middleware::Scanner;
use crate::state::AppState;

/// Request body for a scan
#[derive(Debug, Deserialize)]
pub struct ScanBody {
    /// Raw text decoded from the QR code
    pub qr_text: String,
}

/// Response for a scan
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub status: RedemptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketView>,
}

impl From<RedemptionResult> for ScanResponse {
    fn from(result: RedemptionResult) -> Self {
        Self {
            status: result.status,
            ticket: result.ticket,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ScanErrorResponse {
    pub error: String,
}

/// Map a redemption decision to its HTTP status.
///
/// already_used deliberately stays 200: the scan itself succeeded and the
/// scanner UI needs the ticket body to show who redeemed it and when.
fn http_status(status: RedemptionStatus) -> StatusCode {
    match status {
        RedemptionStatus::ValidUnused | RedemptionStatus::AlreadyUsed => StatusCode::OK,
        RedemptionStatus::Invalid => StatusCode::NOT_FOUND,
        RedemptionStatus::Expired => StatusCode::GONE,
        RedemptionStatus::Revoked => StatusCode::FORBIDDEN,
    }
}

/// Redeem a scanned ticket
pub async fn scan_ticket(
    State(state): State<Arc<AppState>>,
    Scanner(scanner_id): Scanner,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ScanBody>,
) -> Result<(StatusCode, Json<ScanResponse>), impl IntoResponse> {
    let metadata = ScanMetadata {
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ip_address: Some(peer.ip().to_string()),
    };

    let request = ScanRequest {
        scanned_text: body.qr_text,
        scanner_id,
        metadata,
    };

    match state.redemption().redeem(&request) {
        Ok(result) => Ok((http_status(result.status), Json(ScanResponse::from(result)))),
        Err(e @ RedemptionError::MissingScannerId)
        | Err(e @ RedemptionError::EmptyScannedText) => Err((
            StatusCode::BAD_REQUEST,
            Json(ScanErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(RedemptionError::Store(e)) => {
            tracing::error!("Ticket store failure during scan: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ScanErrorResponse {
                    error: "ticket store unavailable, retry".to_string(),
                }),
            ))
        }
    }
}

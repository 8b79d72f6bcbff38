//! Ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turnstile_core::{
    CreateTicketRequest, Ticket, TicketError, TicketFilter, TicketStatus, TicketView,
};

use crate::state::AppState;

/// Maximum allowed limit for ticket queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for ticket queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for issuing a ticket row
#[derive(Debug, Deserialize)]
pub struct IssueTicketBody {
    /// Human-facing serial
    pub serial: String,
    /// Token-format version (defaults to 1)
    pub qr_version: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub event_id: Option<String>,
    pub ticket_type_id: Option<String>,
    pub holder_name: Option<String>,
}

/// Response for a freshly issued ticket.
///
/// The only response that carries the redemption token; the issuance caller
/// needs it exactly once to render the QR code.
#[derive(Debug, Serialize)]
pub struct IssuedTicketResponse {
    #[serde(flatten)]
    pub ticket: TicketView,
    pub qr_token: String,
}

/// Query parameters for listing tickets
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by status (ISSUED, USED, REVOKED, REFUNDED)
    pub status: Option<String>,
    /// Filter by owning event
    pub event_id: Option<String>,
    /// Maximum number of tickets to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<TicketView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TicketErrorResponse {
    pub error: String,
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<TicketErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(TicketErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn not_found(id: &str) -> (StatusCode, Json<TicketErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(TicketErrorResponse {
            error: format!("Ticket not found: {}", id),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Issue a new ticket row
pub async fn issue_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IssueTicketBody>,
) -> Result<(StatusCode, Json<IssuedTicketResponse>), impl IntoResponse> {
    if body.serial.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(TicketErrorResponse {
                error: "serial must not be empty".to_string(),
            }),
        ));
    }

    // Opaque token: random, dot-free so it can never read as a signed payload
    let qr_token = uuid::Uuid::new_v4().simple().to_string();

    let request = CreateTicketRequest {
        serial: body.serial,
        qr_token,
        qr_version: body.qr_version.unwrap_or(1),
        expires_at: body.expires_at,
        event_id: body.event_id,
        ticket_type_id: body.ticket_type_id,
        holder_name: body.holder_name,
    };

    match state.ticket_store().create(request) {
        Ok(ticket) => {
            turnstile_core::metrics::TICKETS_ISSUED_TOTAL.inc();
            let qr_token = ticket.qr_token.clone();
            Ok((
                StatusCode::CREATED,
                Json(IssuedTicketResponse {
                    ticket: TicketView::from(ticket),
                    qr_token,
                }),
            ))
        }
        Err(e) => Err(internal_error(e)),
    }
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TicketView>, impl IntoResponse> {
    match state.ticket_store().get(&id) {
        Ok(Some(ticket)) => Ok(Json(TicketView::from(ticket))),
        Ok(None) => Err(not_found(&id)),
        Err(e) => Err(internal_error(e)),
    }
}

/// List tickets with optional filters
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTicketsParams>,
) -> Result<Json<ListTicketsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = TicketFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status_str) = params.status {
        let Some(status) = TicketStatus::parse(status_str) else {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(TicketErrorResponse {
                    error: format!("Unknown ticket status: {}", status_str),
                }),
            ));
        };
        filter = filter.with_status(status);
    }

    if let Some(ref event_id) = params.event_id {
        filter = filter.with_event_id(event_id);
    }

    let tickets = match state.ticket_store().list(&filter) {
        Ok(tickets) => tickets,
        Err(e) => return Err(internal_error(e)),
    };

    // Get total count (without pagination)
    let count_filter = TicketFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };

    let total = match state.ticket_store().count(&count_filter) {
        Ok(count) => count,
        Err(e) => return Err(internal_error(e)),
    };

    Ok(Json(ListTicketsResponse {
        tickets: tickets.into_iter().map(TicketView::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Administratively revoke a ticket
pub async fn revoke_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TicketView>, impl IntoResponse> {
    // Read first so an already-consumed ticket isn't silently revoked
    let current: Ticket = match state.ticket_store().get(&id) {
        Ok(Some(ticket)) => ticket,
        Ok(None) => return Err(not_found(&id)),
        Err(e) => return Err(internal_error(e)),
    };

    if current.status == TicketStatus::Used {
        return Err((
            StatusCode::CONFLICT,
            Json(TicketErrorResponse {
                error: "Cannot revoke a ticket that was already used".to_string(),
            }),
        ));
    }

    match state.ticket_store().update_status(&id, TicketStatus::Revoked) {
        Ok(ticket) => Ok(Json(TicketView::from(ticket))),
        Err(TicketError::NotFound(_)) => Err(not_found(&id)),
        Err(e) => Err(internal_error(e)),
    }
}

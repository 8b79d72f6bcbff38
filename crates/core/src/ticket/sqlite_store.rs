//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{
    ConsumeOutcome, CreateTicketRequest, Ticket, TicketError, TicketFilter, TicketStatus,
    TicketStore,
};

const TICKET_COLUMNS: &str = "id, serial, status, qr_token, qr_version, issued_at, used_at, expires_at, event_id, ticket_type_id, holder_name";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        // WAL plus a busy timeout lets the scan-log connection write to the
        // same file without tripping over this connection's locks.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| TicketError::Database(e.to_string()))?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                serial TEXT NOT NULL,
                status TEXT NOT NULL,
                qr_token TEXT NOT NULL UNIQUE,
                qr_version INTEGER NOT NULL DEFAULT 1,
                issued_at TEXT NOT NULL,
                used_at TEXT,
                expires_at TEXT,
                event_id TEXT,
                ticket_type_id TEXT,
                holder_name TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_qr_token ON tickets(qr_token);
            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_event_id ON tickets(event_id);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(ref event_id) = filter.event_id {
            conditions.push("event_id = ?");
            params.push(Box::new(event_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let id: String = row.get(0)?;
        let serial: String = row.get(1)?;
        let status_str: String = row.get(2)?;
        let qr_token: String = row.get(3)?;
        let qr_version: i64 = row.get(4)?;
        let issued_at_str: String = row.get(5)?;
        let used_at_str: Option<String> = row.get(6)?;
        let expires_at_str: Option<String> = row.get(7)?;
        let event_id: Option<String> = row.get(8)?;
        let ticket_type_id: Option<String> = row.get(9)?;
        let holder_name: Option<String> = row.get(10)?;

        let status = TicketStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown ticket status: {}", status_str).into(),
            )
        })?;

        Ok(Ticket {
            id,
            serial,
            status,
            qr_token,
            qr_version,
            issued_at: parse_timestamp(&issued_at_str)?,
            used_at: used_at_str.as_deref().map(parse_timestamp).transpose()?,
            expires_at: expires_at_str.as_deref().map(parse_timestamp).transpose()?,
            event_id,
            ticket_type_id,
            holder_name,
        })
    }

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<Ticket>, TicketError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?", TICKET_COLUMNS),
            params![id],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TicketError::Database(e.to_string())),
        }
    }
}

fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let result = conn.execute(
            "INSERT INTO tickets (id, serial, status, qr_token, qr_version, issued_at, used_at, expires_at, event_id, ticket_type_id, holder_name) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.serial,
                TicketStatus::Issued.as_str(),
                request.qr_token,
                request.qr_version,
                now.to_rfc3339(),
                Option::<String>::None,
                request.expires_at.map(|at| at.to_rfc3339()),
                request.event_id,
                request.ticket_type_id,
                request.holder_name,
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(TicketError::DuplicateToken);
            }
            Err(e) => return Err(TicketError::Database(e.to_string())),
        }

        Ok(Ticket {
            id,
            serial: request.serial,
            status: TicketStatus::Issued,
            qr_token: request.qr_token,
            qr_version: request.qr_version,
            issued_at: now,
            used_at: None,
            expires_at: request.expires_at,
            event_id: request.event_id,
            ticket_type_id: request.ticket_type_id,
            holder_name: request.holder_name,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn find_by_token(&self, qr_token: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("SELECT {} FROM tickets WHERE qr_token = ?", TICKET_COLUMNS),
            params![qr_token],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TicketError::Database(e.to_string())),
        }
    }

    fn consume(&self, id: &str, at: DateTime<Utc>) -> Result<ConsumeOutcome, TicketError> {
        let conn = self.conn.lock().unwrap();

        // Single conditional UPDATE: only an ISSUED row transitions. The row
        // count tells us whether this call won the redemption.
        let updated = conn
            .execute(
                "UPDATE tickets SET status = ?, used_at = ? WHERE id = ? AND status = ?",
                params![
                    TicketStatus::Used.as_str(),
                    at.to_rfc3339(),
                    id,
                    TicketStatus::Issued.as_str(),
                ],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let fresh =
            Self::get_locked(&conn, id)?.ok_or_else(|| TicketError::NotFound(id.to_string()))?;

        if updated == 1 {
            Ok(ConsumeOutcome::Consumed(fresh))
        } else {
            Ok(ConsumeOutcome::Conflict(fresh))
        }
    }

    fn update_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, TicketError> {
        let conn = self.conn.lock().unwrap();

        let updated = conn
            .execute(
                "UPDATE tickets SET status = ? WHERE id = ?",
                params![status.as_str(), id],
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(TicketError::NotFound(id.to_string()));
        }

        Self::get_locked(&conn, id)?.ok_or_else(|| TicketError::NotFound(id.to_string()))
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY issued_at DESC LIMIT ? OFFSET ?",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        // Build parameter slice with limit and offset
        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut tickets = Vec::new();
        for row_result in rows {
            let ticket = row_result.map_err(|e| TicketError::Database(e.to_string()))?;
            tickets.push(ticket);
        }

        Ok(tickets)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(count)
    }
}

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{NewScanRecord, ScanFilter, ScanLogError, ScanLogStore, ScanOutcome, ScanRecord};

/// SQLite-backed scan log
pub struct SqliteScanLog {
    conn: Mutex<Connection>,
}

impl SqliteScanLog {
    /// Create a new SQLite scan log, creating the database file and tables if needed
    pub fn new(path: &Path) -> Result<Self, ScanLogError> {
        let conn = Connection::open(path).map_err(|e| ScanLogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite scan log (useful for testing)
    pub fn in_memory() -> Result<Self, ScanLogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ScanLogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ScanLogError> {
        // WAL plus a busy timeout lets the ticket-store connection write to
        // the same file without tripping over this connection's locks.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| ScanLogError::Database(e.to_string()))?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| ScanLogError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scan_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id TEXT,
                scanner_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                scanned_at TEXT NOT NULL,
                user_agent TEXT,
                ip_address TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_scan_records_ticket_id ON scan_records(ticket_id);
            CREATE INDEX IF NOT EXISTS idx_scan_records_scanner_id ON scan_records(scanner_id);
            CREATE INDEX IF NOT EXISTS idx_scan_records_outcome ON scan_records(outcome);
            CREATE INDEX IF NOT EXISTS idx_scan_records_scanned_at ON scan_records(scanned_at);
            "#,
        )
        .map_err(|e| ScanLogError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &ScanFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref ticket_id) = filter.ticket_id {
            conditions.push("ticket_id = ?");
            params.push(Box::new(ticket_id.clone()));
        }

        if let Some(ref scanner_id) = filter.scanner_id {
            conditions.push("scanner_id = ?");
            params.push(Box::new(scanner_id.clone()));
        }

        if let Some(outcome) = filter.outcome {
            conditions.push("outcome = ?");
            params.push(Box::new(outcome.as_str().to_string()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("scanned_at >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("scanned_at <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl ScanLogStore for SqliteScanLog {
    fn insert(&self, record: &NewScanRecord) -> Result<i64, ScanLogError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO scan_records (ticket_id, scanner_id, outcome, scanned_at, user_agent, ip_address) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.ticket_id,
                record.scanner_id,
                record.outcome.as_str(),
                record.scanned_at.to_rfc3339(),
                record.metadata.user_agent,
                record.metadata.ip_address,
            ],
        )
        .map_err(|e| ScanLogError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &ScanFilter) -> Result<Vec<ScanRecord>, ScanLogError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, ticket_id, scanner_id, outcome, scanned_at, user_agent, ip_address FROM scan_records {} ORDER BY scanned_at DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ScanLogError::Database(e.to_string()))?;

        // Build parameter slice with limit and offset
        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let ticket_id: Option<String> = row.get(1)?;
                let scanner_id: String = row.get(2)?;
                let outcome_str: String = row.get(3)?;
                let scanned_at_str: String = row.get(4)?;
                let user_agent: Option<String> = row.get(5)?;
                let ip_address: Option<String> = row.get(6)?;

                Ok((
                    id,
                    ticket_id,
                    scanner_id,
                    outcome_str,
                    scanned_at_str,
                    user_agent,
                    ip_address,
                ))
            })
            .map_err(|e| ScanLogError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, ticket_id, scanner_id, outcome_str, scanned_at_str, user_agent, ip_address) =
                row_result.map_err(|e| ScanLogError::Database(e.to_string()))?;

            let outcome = ScanOutcome::parse(&outcome_str).ok_or_else(|| {
                ScanLogError::Database(format!("unknown scan outcome: {}", outcome_str))
            })?;

            let scanned_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&scanned_at_str)
                .map_err(|e| ScanLogError::Database(format!("Invalid timestamp: {}", e)))?
                .into();

            records.push(ScanRecord {
                id,
                ticket_id,
                scanner_id,
                outcome,
                scanned_at,
                user_agent,
                ip_address,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &ScanFilter) -> Result<i64, ScanLogError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM scan_records {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn
            .query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| ScanLogError::Database(e.to_string()))?;

        Ok(count)
    }
}

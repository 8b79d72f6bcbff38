use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Authenticated scanner identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Scanner/operator identifier recorded on scan records.
    pub scanner_id: String,
    pub method: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            scanner_id: "anonymous".to_string(),
            method: "none".to_string(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Most recently ingested field set for one account. Overwrite semantics:
/// a heartbeat that omits a field drops it for that account.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub fields: Map<String, Value>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusReport {
    pub status: ConnectionStatus,
    pub connected_accounts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeartbeatAck {
    pub status: String,
    pub account_id: String,
    pub fields_updated: Vec<String>,
}

impl HeartbeatAck {
    pub fn new(account_id: impl Into<String>, fields_updated: Vec<String>) -> Self {
        Self {
            status: "success".to_string(),
            account_id: account_id.into(),
            fields_updated,
        }
    }
}

/// Structured error body returned in place of a transport-level failure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorReply {
    pub status: String,
    pub message: String,
}

impl ErrorReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectActiveRequest {
    pub account_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SelectActiveReply {
    pub status: String,
    pub active_account_id: String,
}

impl SelectActiveReply {
    pub fn new(active_account_id: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            active_account_id: active_account_id.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActiveAccountReply {
    pub active_account_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DisconnectReply {
    pub status: String,
    pub account_id: String,
}

impl DisconnectReply {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            status: "disconnected".to_string(),
            account_id: account_id.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthCheckReply {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

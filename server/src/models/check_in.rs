use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "check_in_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckInMethod {
    QrScan,
    Manual,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInMethod::QrScan => "qr_scan",
            CheckInMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for CheckInMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendance record. At most one exists per ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CheckIn {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub staff_id: Uuid,
    pub method: CheckInMethod,
    pub notes: Option<String>,
    pub checked_in_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub staff_id: Uuid,
    pub method: CheckInMethod,
    pub notes: Option<String>,
    pub checked_in_at: DateTime<Utc>,
}

impl NewCheckIn {
    pub fn into_check_in(self) -> CheckIn {
        CheckIn {
            id: self.id,
            ticket_id: self.ticket_id,
            event_id: self.event_id,
            staff_id: self.staff_id,
            method: self.method,
            notes: self.notes,
            checked_in_at: self.checked_in_at,
        }
    }
}

pub const AUDIT_ACTION_UNDO: &str = "undo";

/// Request to revert a check-in; always leaves an audit row behind.
#[derive(Debug, Clone)]
pub struct UndoCheckIn {
    pub ticket_id: Uuid,
    pub actor_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CheckInAudit {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub action: String,
    pub actor_id: Uuid,
    pub reason: Option<String>,
    pub check_in_method: CheckInMethod,
    pub checked_in_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CheckInStats {
    pub total_tickets: i64,
    pub checked_in: i64,
    pub by_qr_scan: i64,
    pub by_manual: i64,
}

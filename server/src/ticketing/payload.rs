//! Wire format carried inside a ticket's QR code.
//!
//! Changing the required field set breaks every ticket already issued, so
//! parsing only insists on the four fields below and ignores anything else.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Ticket;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("code is empty")]
    Empty,

    #[error("code is not a ticket payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ticket token is empty")]
    EmptyToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayload {
    pub event_id: Uuid,
    pub rsvp_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl TicketPayload {
    pub fn for_ticket(ticket: &Ticket) -> Self {
        Self {
            event_id: ticket.event_id,
            rsvp_id: ticket.id,
            token: ticket.token.clone(),
            created_at: ticket.created_at,
        }
    }

    /// Validates scanned text. Nothing reaches the ticket store without
    /// passing through here.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PayloadError::Empty);
        }
        let payload: TicketPayload = serde_json::from_str(raw)?;
        if payload.token.trim().is_empty() {
            return Err(PayloadError::EmptyToken);
        }
        Ok(payload)
    }

    /// Compact JSON with a fixed field order.
    pub fn to_wire(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromStr for TicketPayload {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

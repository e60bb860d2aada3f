use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An RSVP record. The `token` is issued once and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_tier_id: Option<Uuid>,
    pub token: String,
    pub checked_in: bool,
    pub created_at: DateTime<Utc>,
}

/// Values for inserting a ticket. Tier capacity is reserved in the same step.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_tier_id: Option<Uuid>,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl NewTicket {
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            id: self.id,
            event_id: self.event_id,
            user_id: self.user_id,
            ticket_tier_id: self.ticket_tier_id,
            token: self.token,
            checked_in: false,
            created_at: self.created_at,
        }
    }
}

/// Search result row for the manual lookup at the door. Omits the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TicketSummary {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub ticket_tier_id: Option<Uuid>,
    pub checked_in: bool,
    pub created_at: DateTime<Utc>,
    pub attendee_name: String,
    pub attendee_email: String,
    pub tier_name: Option<String>,
}

//! Ticket store: the single source of truth for tickets and check-ins.
//!
//! Every mutation of check-in state funnels through [`TicketStore::insert_check_in`]
//! and [`TicketStore::undo_check_in`]. Implementations must enforce the uniqueness
//! constraints below atomically; callers rely on them instead of locking.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CheckIn, CheckInAudit, CheckInStats, Event, NewCheckIn, NewTicket, Ticket, TicketSummary,
    TicketTier, UndoCheckIn, User,
};
use crate::utils::retry::Retryable;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgTicketStore;

/// One ticket per (event, attendee).
pub const TICKET_EVENT_USER_KEY: &str = "tickets_event_id_user_id_key";
/// Tokens are unique system-wide.
pub const TICKET_TOKEN_KEY: &str = "tickets_token_key";
/// One check-in per ticket.
pub const CHECK_IN_TICKET_KEY: &str = "check_ins_ticket_id_key";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("ticket tier {0} has no remaining capacity")]
    CapacityExhausted(Uuid),

    #[error("database error")]
    Database(#[source] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unique(constraint: impl Into<String>) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.into(),
        }
    }

    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Unavailable(_))
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn find_tier(&self, id: Uuid) -> Result<Option<TicketTier>, StoreError>;

    /// Inserts a ticket and, when it references a tier, takes one unit of that
    /// tier's capacity in the same atomic step.
    ///
    /// Fails with [`StoreError::UniqueViolation`] on a duplicate RSVP or token and
    /// with [`StoreError::CapacityExhausted`] when the tier is sold out.
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, StoreError>;

    /// Deletes a ticket that has not been checked in and releases its tier
    /// capacity. Returns `None` when no such unchecked ticket exists.
    async fn cancel_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Looks a ticket up by id and token together; both must match.
    async fn find_ticket_by_token(
        &self,
        id: Uuid,
        token: &str,
    ) -> Result<Option<Ticket>, StoreError>;

    async fn find_check_in(&self, ticket_id: Uuid) -> Result<Option<CheckIn>, StoreError>;

    /// Records a check-in and flips the ticket's `checked_in` flag.
    ///
    /// A second insert for the same ticket fails with a uniqueness violation on
    /// [`CHECK_IN_TICKET_KEY`], however the two calls interleave.
    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckIn, StoreError>;

    /// Removes a check-in, clears the ticket's flag and appends an audit row.
    /// Returns `None` when the ticket has no check-in.
    async fn undo_check_in(&self, undo: UndoCheckIn) -> Result<Option<CheckInAudit>, StoreError>;

    /// Case-insensitive substring match on attendee name or email within one event.
    async fn search_tickets(
        &self,
        event_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<TicketSummary>, StoreError>;

    async fn check_in_stats(&self, event_id: Uuid) -> Result<CheckInStats, StoreError>;
}

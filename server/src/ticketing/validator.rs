//! Authoritative check-in transition.
//!
//! Both entry points share one commit path. A ticket is checked in at most
//! once; the store's uniqueness constraint on the check-in's ticket reference
//! decides races, and the loser is reported as [`CheckInError::AlreadyCheckedIn`].

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::payload::{PayloadError, TicketPayload};
use crate::models::{CheckIn, CheckInAudit, CheckInMethod, NewCheckIn, Ticket, UndoCheckIn};
use crate::store::{StoreError, TicketStore};
use crate::utils::retry::Retryable;

#[derive(Debug, Clone, Serialize)]
pub struct CheckInOutcome {
    pub ticket: Ticket,
    pub check_in: CheckIn,
}

#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("malformed code: {0}")]
    MalformedInput(#[from] PayloadError),

    #[error("invalid or expired code")]
    NotFound,

    #[error("code does not belong to this event")]
    WrongEvent { expected: Uuid, actual: Uuid },

    /// Carries the ticket and the check-in that was already recorded.
    #[error("already checked in")]
    AlreadyCheckedIn(Box<CheckInOutcome>),

    /// Only returned by undo.
    #[error("ticket is not checked in")]
    NotCheckedIn,

    #[error("ticket store unavailable")]
    TransientStore(#[source] StoreError),
}

impl From<StoreError> for CheckInError {
    fn from(err: StoreError) -> Self {
        CheckInError::TransientStore(err)
    }
}

impl Retryable for CheckInError {
    fn is_retryable(&self) -> bool {
        matches!(self, CheckInError::TransientStore(_))
    }
}

pub struct CheckInValidator {
    store: Arc<dyn TicketStore>,
}

impl CheckInValidator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Checks a ticket in from the text read off its QR code.
    ///
    /// `active_event_id` is the event the scanning station is working.
    pub async fn check_in_by_code(
        &self,
        raw: &str,
        active_event_id: Uuid,
        staff_id: Uuid,
    ) -> Result<CheckInOutcome, CheckInError> {
        let payload = TicketPayload::parse(raw)?;

        let ticket = self
            .store
            .find_ticket_by_token(payload.rsvp_id, &payload.token)
            .await?
            .ok_or(CheckInError::NotFound)?;

        if ticket.event_id != payload.event_id || payload.event_id != active_event_id {
            warn!(
                ticket_id = %ticket.id,
                ticket_event = %ticket.event_id,
                payload_event = %payload.event_id,
                active_event = %active_event_id,
                "ticket scanned at the wrong event"
            );
            return Err(CheckInError::WrongEvent {
                expected: active_event_id,
                actual: ticket.event_id,
            });
        }

        self.commit(ticket, staff_id, CheckInMethod::QrScan, None)
            .await
    }

    /// Checks a ticket in that staff picked from search results.
    pub async fn check_in_manually(
        &self,
        ticket_id: Uuid,
        event_id: Uuid,
        staff_id: Uuid,
        notes: Option<String>,
    ) -> Result<CheckInOutcome, CheckInError> {
        let ticket = self.ticket_for_event(ticket_id, event_id).await?;
        self.commit(ticket, staff_id, CheckInMethod::Manual, notes)
            .await
    }

    /// Reverts a check-in. The store writes an audit row in the same step.
    pub async fn undo_check_in(
        &self,
        ticket_id: Uuid,
        event_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<CheckInAudit, CheckInError> {
        self.ticket_for_event(ticket_id, event_id).await?;

        let audit = self
            .store
            .undo_check_in(UndoCheckIn {
                ticket_id,
                actor_id,
                reason,
            })
            .await?
            .ok_or(CheckInError::NotCheckedIn)?;

        warn!(
            ticket_id = %ticket_id,
            event_id = %event_id,
            actor_id = %actor_id,
            "check-in undone"
        );
        Ok(audit)
    }

    async fn ticket_for_event(&self, ticket_id: Uuid, event_id: Uuid) -> Result<Ticket, CheckInError> {
        let ticket = self
            .store
            .find_ticket(ticket_id)
            .await?
            .ok_or(CheckInError::NotFound)?;
        if ticket.event_id != event_id {
            return Err(CheckInError::WrongEvent {
                expected: event_id,
                actual: ticket.event_id,
            });
        }
        Ok(ticket)
    }

    async fn commit(
        &self,
        mut ticket: Ticket,
        staff_id: Uuid,
        method: CheckInMethod,
        notes: Option<String>,
    ) -> Result<CheckInOutcome, CheckInError> {
        if let Some(existing) = self.store.find_check_in(ticket.id).await? {
            return Err(already_checked_in(ticket, existing));
        }

        let new_check_in = NewCheckIn {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            staff_id,
            method,
            notes,
            checked_in_at: Utc::now().trunc_subsecs(6),
        };

        match self.store.insert_check_in(new_check_in).await {
            Ok(check_in) => {
                ticket.checked_in = true;
                info!(
                    ticket_id = %ticket.id,
                    event_id = %ticket.event_id,
                    staff_id = %staff_id,
                    method = %method,
                    "attendee checked in"
                );
                Ok(CheckInOutcome { ticket, check_in })
            }
            Err(err @ StoreError::UniqueViolation { .. }) => {
                // Lost the race; report whichever check-in won.
                match self.store.find_check_in(ticket.id).await? {
                    Some(winner) => {
                        ticket.checked_in = true;
                        Err(already_checked_in(ticket, winner))
                    }
                    None => Err(CheckInError::TransientStore(err)),
                }
            }
            Err(err) => Err(CheckInError::TransientStore(err)),
        }
    }
}

fn already_checked_in(ticket: Ticket, check_in: CheckIn) -> CheckInError {
    CheckInError::AlreadyCheckedIn(Box::new(CheckInOutcome { ticket, check_in }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTicket;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        validator: CheckInValidator,
        ticket: Ticket,
        staff_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Olga Organizer", "olga@example.com").await;
        let attendee = store.insert_user("Ana Attendee", "ana@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let ticket = store
            .create_ticket(NewTicket {
                id: Uuid::new_v4(),
                event_id: event.id,
                user_id: attendee.id,
                ticket_tier_id: None,
                token: "abc-123".to_string(),
                created_at: Utc::now().trunc_subsecs(6),
            })
            .await
            .unwrap();
        let validator = CheckInValidator::new(store.clone());
        Fixture {
            store,
            validator,
            ticket,
            staff_id: organizer.id,
        }
    }

    fn code_for(ticket: &Ticket) -> String {
        TicketPayload::for_ticket(ticket).to_wire().unwrap()
    }

    #[tokio::test]
    async fn test_scan_checks_in_once() {
        let fx = fixture().await;
        let code = code_for(&fx.ticket);

        let outcome = fx
            .validator
            .check_in_by_code(&code, fx.ticket.event_id, fx.staff_id)
            .await
            .unwrap();
        assert!(outcome.ticket.checked_in);
        assert_eq!(outcome.check_in.method, CheckInMethod::QrScan);
        assert_eq!(outcome.check_in.staff_id, fx.staff_id);

        let err = fx
            .validator
            .check_in_by_code(&code, fx.ticket.event_id, fx.staff_id)
            .await
            .unwrap_err();
        match err {
            CheckInError::AlreadyCheckedIn(existing) => {
                assert_eq!(existing.check_in, outcome.check_in);
            }
            other => panic!("expected already checked in, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_code_is_malformed() {
        let fx = fixture().await;
        let err = fx
            .validator
            .check_in_by_code("{not json", fx.ticket.event_id, fx.staff_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::MalformedInput(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_forged_token_is_not_found() {
        let fx = fixture().await;
        let mut payload = TicketPayload::for_ticket(&fx.ticket);
        payload.token = "wrong".to_string();

        let err = fx
            .validator
            .check_in_by_code(&payload.to_wire().unwrap(), fx.ticket.event_id, fx.staff_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::NotFound));
    }

    #[tokio::test]
    async fn test_valid_ticket_at_other_event_is_wrong_event() {
        let fx = fixture().await;
        let other_event = Uuid::new_v4();

        let err = fx
            .validator
            .check_in_by_code(&code_for(&fx.ticket), other_event, fx.staff_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckInError::WrongEvent { expected, actual }
                if expected == other_event && actual == fx.ticket.event_id
        ));
        assert_eq!(fx.store.check_in_count(fx.ticket.id).await, 0);
    }

    #[tokio::test]
    async fn test_manual_check_in_records_notes() {
        let fx = fixture().await;
        let outcome = fx
            .validator
            .check_in_manually(
                fx.ticket.id,
                fx.ticket.event_id,
                fx.staff_id,
                Some("phone battery dead".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(outcome.check_in.method, CheckInMethod::Manual);
        assert_eq!(outcome.check_in.notes.as_deref(), Some("phone battery dead"));
    }

    #[tokio::test]
    async fn test_manual_check_in_rejects_unknown_and_foreign_tickets() {
        let fx = fixture().await;

        let missing = fx
            .validator
            .check_in_manually(Uuid::new_v4(), fx.ticket.event_id, fx.staff_id, None)
            .await
            .unwrap_err();
        assert!(matches!(missing, CheckInError::NotFound));

        let foreign = fx
            .validator
            .check_in_manually(fx.ticket.id, Uuid::new_v4(), fx.staff_id, None)
            .await
            .unwrap_err();
        assert!(matches!(foreign, CheckInError::WrongEvent { .. }));
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable() {
        let fx = fixture().await;
        fx.store.fail_next_calls(1);

        let err = fx
            .validator
            .check_in_manually(fx.ticket.id, fx.ticket.event_id, fx.staff_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::TransientStore(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_undo_audits_and_allows_new_check_in() {
        let fx = fixture().await;
        let first = fx
            .validator
            .check_in_by_code(&code_for(&fx.ticket), fx.ticket.event_id, fx.staff_id)
            .await
            .unwrap();

        let audit = fx
            .validator
            .undo_check_in(
                fx.ticket.id,
                fx.ticket.event_id,
                fx.staff_id,
                Some("scanned wrong badge".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(audit.checked_in_at, first.check_in.checked_in_at);
        assert_eq!(audit.reason.as_deref(), Some("scanned wrong badge"));
        assert_eq!(fx.store.audits().await.len(), 1);
        assert!(!fx.store.find_ticket(fx.ticket.id).await.unwrap().unwrap().checked_in);

        let again = fx
            .validator
            .check_in_manually(fx.ticket.id, fx.ticket.event_id, fx.staff_id, None)
            .await
            .unwrap();
        assert_ne!(again.check_in.id, first.check_in.id);
    }

    #[tokio::test]
    async fn test_undo_without_check_in_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .validator
            .undo_check_in(fx.ticket.id, fx.ticket.event_id, fx.staff_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckInError::NotCheckedIn));
        assert!(fx.store.audits().await.is_empty());
    }
}

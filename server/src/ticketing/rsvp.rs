use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::encoder::{EncodeError, TicketEncoder};
use super::payload::TicketPayload;
use super::token::TokenIssuer;
use super::validator::CheckInOutcome;
use crate::email::{deliver_confirmation, Mailer, TicketConfirmation};
use crate::models::{Event, NewTicket, Ticket};
use crate::store::{StoreError, TicketStore, TICKET_EVENT_USER_KEY, TICKET_TOKEN_KEY};
use crate::utils::retry::Retryable;

const MAX_TOKEN_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum RsvpError {
    #[error("event not found")]
    EventNotFound,

    #[error("event is not open for RSVPs")]
    EventNotPublished,

    #[error("ticket tier not found for this event")]
    TierNotFound,

    #[error("ticket tier is sold out")]
    SoldOut,

    #[error("already RSVPed to this event")]
    AlreadyRsvped,

    #[error("ticket not found")]
    TicketNotFound,

    #[error("ticket belongs to another attendee")]
    Forbidden,

    /// Carries the recorded check-in when it could be read back.
    #[error("checked-in tickets cannot be cancelled")]
    AlreadyCheckedIn(Option<Box<CheckInOutcome>>),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("ticket store unavailable")]
    Store(#[from] StoreError),
}

impl Retryable for RsvpError {
    fn is_retryable(&self) -> bool {
        matches!(self, RsvpError::Store(_))
    }
}

/// A freshly issued (or re-displayed) ticket with its QR code.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTicket {
    pub ticket: Ticket,
    pub payload: TicketPayload,
    pub qr_data_uri: String,
}

pub struct RsvpService {
    store: Arc<dyn TicketStore>,
    issuer: TokenIssuer,
    encoder: TicketEncoder,
    mailer: Arc<dyn Mailer>,
}

impl RsvpService {
    pub fn new(store: Arc<dyn TicketStore>, encoder: TicketEncoder, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            issuer: TokenIssuer::new(),
            encoder,
            mailer,
        }
    }

    pub fn encoder(&self) -> &TicketEncoder {
        &self.encoder
    }

    /// Issues a ticket for `user_id`. Tier capacity is taken atomically with
    /// the insert, so concurrent RSVPs cannot oversell a tier.
    pub async fn create_rsvp(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        tier_id: Option<Uuid>,
    ) -> Result<IssuedTicket, RsvpError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(RsvpError::EventNotFound)?;
        if !event.is_published {
            return Err(RsvpError::EventNotPublished);
        }
        if let Some(tier_id) = tier_id {
            let tier = self.store.find_tier(tier_id).await?;
            if !tier.is_some_and(|tier| tier.event_id == event_id) {
                return Err(RsvpError::TierNotFound);
            }
        }

        let ticket = self.insert_with_fresh_token(event_id, user_id, tier_id).await?;
        let issued = self.render(ticket)?;
        info!(
            ticket_id = %issued.ticket.id,
            event_id = %event_id,
            user_id = %user_id,
            "ticket issued"
        );

        self.send_confirmation(event, &issued);
        Ok(issued)
    }

    async fn insert_with_fresh_token(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        tier_id: Option<Uuid>,
    ) -> Result<Ticket, RsvpError> {
        let mut attempt = 1;
        loop {
            let new_ticket = NewTicket {
                id: Uuid::new_v4(),
                event_id,
                user_id,
                ticket_tier_id: tier_id,
                token: self.issuer.issue(),
                created_at: Utc::now().trunc_subsecs(6),
            };
            match self.store.create_ticket(new_ticket).await {
                Ok(ticket) => return Ok(ticket),
                Err(err) if err.is_unique_violation_of(TICKET_TOKEN_KEY) && attempt < MAX_TOKEN_ATTEMPTS => {
                    warn!(attempt, "ticket token collision, reissuing");
                    attempt += 1;
                }
                Err(err) if err.is_unique_violation_of(TICKET_EVENT_USER_KEY) => {
                    return Err(RsvpError::AlreadyRsvped)
                }
                Err(StoreError::CapacityExhausted(_)) => return Err(RsvpError::SoldOut),
                Err(err) => return Err(RsvpError::Store(err)),
            }
        }
    }

    fn render(&self, ticket: Ticket) -> Result<IssuedTicket, RsvpError> {
        let payload = TicketPayload::for_ticket(&ticket);
        let qr_data_uri = self.encoder.to_data_uri(&payload)?;
        Ok(IssuedTicket {
            ticket,
            payload,
            qr_data_uri,
        })
    }

    fn send_confirmation(&self, event: Event, issued: &IssuedTicket) {
        let store = Arc::clone(&self.store);
        let mailer = Arc::clone(&self.mailer);
        let user_id = issued.ticket.user_id;
        let ticket_id = issued.ticket.id;
        let qr_data_uri = issued.qr_data_uri.clone();

        tokio::spawn(async move {
            let attendee = match store.find_user(user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    warn!(user_id = %user_id, "no attendee record, skipping confirmation");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, user_id = %user_id, "attendee lookup failed");
                    return;
                }
            };
            let message = TicketConfirmation {
                to: attendee.mailbox(),
                attendee_name: attendee.name,
                event_title: event.title,
                starts_at: event.start_time,
                ticket_id,
                qr_data_uri,
            };
            deliver_confirmation(mailer.as_ref(), &message).await;
        });
    }

    /// Deletes the caller's own ticket and returns its tier seat.
    pub async fn cancel_rsvp(&self, ticket_id: Uuid, user_id: Uuid) -> Result<Ticket, RsvpError> {
        let ticket = self
            .store
            .find_ticket(ticket_id)
            .await?
            .ok_or(RsvpError::TicketNotFound)?;
        if ticket.user_id != user_id {
            return Err(RsvpError::Forbidden);
        }
        if ticket.checked_in {
            return Err(self.checked_in_error(ticket).await?);
        }

        match self.store.cancel_ticket(ticket_id).await? {
            Some(cancelled) => {
                info!(ticket_id = %ticket_id, user_id = %user_id, "RSVP cancelled");
                Ok(cancelled)
            }
            // Checked in between the read and the delete, or cancelled twice.
            None => match self.store.find_ticket(ticket_id).await? {
                Some(current) => Err(self.checked_in_error(current).await?),
                None => Err(RsvpError::TicketNotFound),
            },
        }
    }

    async fn checked_in_error(&self, ticket: Ticket) -> Result<RsvpError, RsvpError> {
        let existing = self.store.find_check_in(ticket.id).await?;
        Ok(RsvpError::AlreadyCheckedIn(existing.map(|check_in| {
            Box::new(CheckInOutcome { ticket, check_in })
        })))
    }

    /// Re-renders the owner's ticket for display.
    pub async fn ticket_for_display(
        &self,
        ticket_id: Uuid,
        user_id: Uuid,
    ) -> Result<IssuedTicket, RsvpError> {
        let ticket = self
            .store
            .find_ticket(ticket_id)
            .await?
            .ok_or(RsvpError::TicketNotFound)?;
        if ticket.user_id != user_id {
            return Err(RsvpError::Forbidden);
        }
        self.render(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::tests::RecordingMailer;
    use crate::email::LogMailer;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn service(store: &Arc<MemoryStore>) -> RsvpService {
        RsvpService::new(store.clone(), TicketEncoder::default(), Arc::new(LogMailer))
    }

    #[tokio::test]
    async fn test_rsvp_issues_ticket_with_qr() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let attendee = store.insert_user("Ana", "ana@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;

        let issued = service(&store)
            .create_rsvp(event.id, attendee.id, None)
            .await
            .unwrap();

        assert!(!issued.ticket.checked_in);
        assert_eq!(issued.payload.rsvp_id, issued.ticket.id);
        assert_eq!(issued.payload.token, issued.ticket.token);
        assert!(issued.qr_data_uri.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_rsvp_rejections() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let attendee = store.insert_user("Ana", "ana@example.com").await;
        let draft = store.insert_event(organizer.id, "Draft", false).await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let foreign_tier = store.insert_tier(draft.id, "VIP", 5).await;
        let rsvps = service(&store);

        assert!(matches!(
            rsvps.create_rsvp(Uuid::new_v4(), attendee.id, None).await,
            Err(RsvpError::EventNotFound)
        ));
        assert!(matches!(
            rsvps.create_rsvp(draft.id, attendee.id, None).await,
            Err(RsvpError::EventNotPublished)
        ));
        assert!(matches!(
            rsvps.create_rsvp(event.id, attendee.id, Some(foreign_tier.id)).await,
            Err(RsvpError::TierNotFound)
        ));

        rsvps.create_rsvp(event.id, attendee.id, None).await.unwrap();
        assert!(matches!(
            rsvps.create_rsvp(event.id, attendee.id, None).await,
            Err(RsvpError::AlreadyRsvped)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_rsvps_do_not_oversell() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let event = store.insert_event(organizer.id, "Small room", true).await;
        let tier = store.insert_tier(event.id, "General", 3).await;
        let rsvps = Arc::new(service(&store));

        let mut handles = Vec::new();
        for i in 0..10 {
            let user = store
                .insert_user(&format!("Guest {i}"), &format!("g{i}@example.com"))
                .await;
            let rsvps = Arc::clone(&rsvps);
            let (event_id, tier_id) = (event.id, tier.id);
            handles.push(tokio::spawn(async move {
                rsvps.create_rsvp(event_id, user.id, Some(tier_id)).await
            }));
        }

        let mut issued = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => issued += 1,
                Err(RsvpError::SoldOut) => sold_out += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(issued, 3);
        assert_eq!(sold_out, 7);
        assert_eq!(store.find_tier(tier.id).await.unwrap().unwrap().available_quantity, 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_seat_and_checks_owner() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let attendee = store.insert_user("Ana", "ana@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let tier = store.insert_tier(event.id, "General", 1).await;
        let rsvps = service(&store);

        let issued = rsvps
            .create_rsvp(event.id, attendee.id, Some(tier.id))
            .await
            .unwrap();
        assert!(matches!(
            rsvps.cancel_rsvp(issued.ticket.id, organizer.id).await,
            Err(RsvpError::Forbidden)
        ));

        rsvps.cancel_rsvp(issued.ticket.id, attendee.id).await.unwrap();
        assert_eq!(store.find_tier(tier.id).await.unwrap().unwrap().available_quantity, 1);
        assert!(matches!(
            rsvps.cancel_rsvp(issued.ticket.id, attendee.id).await,
            Err(RsvpError::TicketNotFound)
        ));
    }

    #[tokio::test]
    async fn test_checked_in_ticket_cannot_be_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let attendee = store.insert_user("Ana", "ana@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let rsvps = service(&store);
        let issued = rsvps.create_rsvp(event.id, attendee.id, None).await.unwrap();

        let validator = crate::ticketing::CheckInValidator::new(store.clone());
        let outcome = validator
            .check_in_manually(issued.ticket.id, event.id, organizer.id, None)
            .await
            .unwrap();

        match rsvps.cancel_rsvp(issued.ticket.id, attendee.id).await {
            Err(RsvpError::AlreadyCheckedIn(Some(existing))) => {
                assert_eq!(existing.check_in, outcome.check_in);
                assert!(existing.ticket.checked_in);
            }
            other => panic!("expected already checked in, got {other:?}"),
        }
        assert!(store.find_ticket(issued.ticket.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_confirmation_is_sent_and_failure_does_not_undo_ticket() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let attendee = store.insert_user("Ana", "ana@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let mailer = Arc::new(RecordingMailer::default());
        let rsvps = RsvpService::new(store.clone(), TicketEncoder::default(), mailer.clone());

        let issued = rsvps.create_rsvp(event.id, attendee.id, None).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while mailer.sent.lock().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let sent = mailer.sent.lock().await.clone();
        assert_eq!(sent[0].to, "Ana <ana@example.com>");
        assert_eq!(sent[0].ticket_id, issued.ticket.id);

        let failing = Arc::new(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        let other = store.insert_user("Bo", "bo@example.com").await;
        let rsvps = RsvpService::new(store.clone(), TicketEncoder::default(), failing);
        let issued = rsvps.create_rsvp(event.id, other.id, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.find_ticket(issued.ticket.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_display_is_owner_only() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let attendee = store.insert_user("Ana", "ana@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let rsvps = service(&store);
        let issued = rsvps.create_rsvp(event.id, attendee.id, None).await.unwrap();

        let shown = rsvps
            .ticket_for_display(issued.ticket.id, attendee.id)
            .await
            .unwrap();
        assert_eq!(shown.payload, issued.payload);
        assert!(matches!(
            rsvps.ticket_for_display(issued.ticket.id, organizer.id).await,
            Err(RsvpError::Forbidden)
        ));
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    StoreError, TicketStore, CHECK_IN_TICKET_KEY, TICKET_EVENT_USER_KEY, TICKET_TOKEN_KEY,
};
use crate::models::{
    CheckIn, CheckInAudit, CheckInMethod, CheckInStats, Event, NewCheckIn, NewTicket, Ticket,
    TicketSummary, TicketTier, UndoCheckIn, User, AUDIT_ACTION_UNDO,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    tiers: HashMap<Uuid, TicketTier>,
    tickets: HashMap<Uuid, Ticket>,
    check_ins: HashMap<Uuid, CheckIn>,
    audits: Vec<CheckInAudit>,
}

/// In-process store used by tests and `IKOU_STORE=memory` demos.
///
/// All tables sit behind one lock, so each trait method is atomic in the same
/// way a single-statement transaction is in PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` store calls fail with [`StoreError::Unavailable`].
    pub fn fail_next_calls(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        let tripped = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn insert_user(&self, name: &str, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }

    pub async fn insert_event(&self, organizer_id: Uuid, title: &str, is_published: bool) -> Event {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: title.to_string(),
            description: None,
            location: "Community Hall".to_string(),
            start_time: now + Duration::days(7),
            end_time: None,
            is_published,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .lock()
            .await
            .events
            .insert(event.id, event.clone());
        event
    }

    pub async fn insert_tier(&self, event_id: Uuid, name: &str, quantity: i32) -> TicketTier {
        let now = Utc::now();
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            description: None,
            price: Decimal::ZERO,
            total_quantity: quantity,
            available_quantity: quantity,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.tiers.insert(tier.id, tier.clone());
        tier
    }

    pub async fn audits(&self) -> Vec<CheckInAudit> {
        self.tables.lock().await.audits.clone()
    }

    pub async fn check_in_count(&self, ticket_id: Uuid) -> usize {
        self.tables
            .lock()
            .await
            .check_ins
            .values()
            .filter(|check_in| check_in.ticket_id == ticket_id)
            .count()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.injected_failure()?;
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        self.injected_failure()?;
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn find_tier(&self, id: Uuid) -> Result<Option<TicketTier>, StoreError> {
        self.injected_failure()?;
        Ok(self.tables.lock().await.tiers.get(&id).cloned())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        self.injected_failure()?;
        let mut tables = self.tables.lock().await;

        let duplicate_rsvp = tables
            .tickets
            .values()
            .any(|t| t.event_id == ticket.event_id && t.user_id == ticket.user_id);
        if duplicate_rsvp {
            return Err(StoreError::unique(TICKET_EVENT_USER_KEY));
        }
        if tables.tickets.values().any(|t| t.token == ticket.token) {
            return Err(StoreError::unique(TICKET_TOKEN_KEY));
        }

        if let Some(tier_id) = ticket.ticket_tier_id {
            let tier = tables
                .tiers
                .get_mut(&tier_id)
                .ok_or(StoreError::CapacityExhausted(tier_id))?;
            if tier.available_quantity <= 0 {
                return Err(StoreError::CapacityExhausted(tier_id));
            }
            tier.available_quantity -= 1;
            tier.updated_at = Utc::now();
        }

        let ticket = ticket.into_ticket();
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn cancel_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        self.injected_failure()?;
        let mut tables = self.tables.lock().await;

        let cancellable = tables.tickets.get(&id).is_some_and(|t| !t.checked_in);
        if !cancellable {
            return Ok(None);
        }
        let Some(ticket) = tables.tickets.remove(&id) else {
            return Ok(None);
        };
        if let Some(tier) = ticket
            .ticket_tier_id
            .and_then(|tier_id| tables.tiers.get_mut(&tier_id))
        {
            tier.available_quantity = (tier.available_quantity + 1).min(tier.total_quantity);
            tier.updated_at = Utc::now();
        }
        Ok(Some(ticket))
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        self.injected_failure()?;
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn find_ticket_by_token(
        &self,
        id: Uuid,
        token: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        self.injected_failure()?;
        Ok(self
            .tables
            .lock()
            .await
            .tickets
            .get(&id)
            .filter(|ticket| ticket.token == token)
            .cloned())
    }

    async fn find_check_in(&self, ticket_id: Uuid) -> Result<Option<CheckIn>, StoreError> {
        self.injected_failure()?;
        Ok(self.tables.lock().await.check_ins.get(&ticket_id).cloned())
    }

    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckIn, StoreError> {
        self.injected_failure()?;
        let mut tables = self.tables.lock().await;

        if tables.check_ins.contains_key(&check_in.ticket_id) {
            return Err(StoreError::unique(CHECK_IN_TICKET_KEY));
        }
        let Some(ticket) = tables.tickets.get_mut(&check_in.ticket_id) else {
            return Err(StoreError::Unavailable(format!(
                "ticket {} disappeared before check-in",
                check_in.ticket_id
            )));
        };
        ticket.checked_in = true;

        let check_in = check_in.into_check_in();
        tables.check_ins.insert(check_in.ticket_id, check_in.clone());
        Ok(check_in)
    }

    async fn undo_check_in(&self, undo: UndoCheckIn) -> Result<Option<CheckInAudit>, StoreError> {
        self.injected_failure()?;
        let mut tables = self.tables.lock().await;

        let Some(removed) = tables.check_ins.remove(&undo.ticket_id) else {
            return Ok(None);
        };
        if let Some(ticket) = tables.tickets.get_mut(&undo.ticket_id) {
            ticket.checked_in = false;
        }

        let audit = CheckInAudit {
            id: Uuid::new_v4(),
            ticket_id: removed.ticket_id,
            event_id: removed.event_id,
            action: AUDIT_ACTION_UNDO.to_string(),
            actor_id: undo.actor_id,
            reason: undo.reason,
            check_in_method: removed.method,
            checked_in_at: removed.checked_in_at,
            created_at: Utc::now(),
        };
        tables.audits.push(audit.clone());
        Ok(Some(audit))
    }

    async fn search_tickets(
        &self,
        event_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<TicketSummary>, StoreError> {
        self.injected_failure()?;
        let tables = self.tables.lock().await;
        let needle = query.to_lowercase();

        let mut matches: Vec<TicketSummary> = tables
            .tickets
            .values()
            .filter(|ticket| ticket.event_id == event_id)
            .filter_map(|ticket| {
                let user = tables.users.get(&ticket.user_id)?;
                let hit = user.name.to_lowercase().contains(&needle)
                    || user.email.to_lowercase().contains(&needle);
                hit.then(|| TicketSummary {
                    ticket_id: ticket.id,
                    event_id: ticket.event_id,
                    user_id: ticket.user_id,
                    ticket_tier_id: ticket.ticket_tier_id,
                    checked_in: ticket.checked_in,
                    created_at: ticket.created_at,
                    attendee_name: user.name.clone(),
                    attendee_email: user.email.clone(),
                    tier_name: ticket
                        .ticket_tier_id
                        .and_then(|tier_id| tables.tiers.get(&tier_id))
                        .map(|tier| tier.name.clone()),
                })
            })
            .collect();

        // Case-insensitive, like the database's collation.
        matches.sort_by_cached_key(|summary| {
            (summary.attendee_name.to_lowercase(), summary.created_at)
        });
        matches.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(matches)
    }

    async fn check_in_stats(&self, event_id: Uuid) -> Result<CheckInStats, StoreError> {
        self.injected_failure()?;
        let tables = self.tables.lock().await;

        let mut stats = CheckInStats::default();
        for ticket in tables.tickets.values().filter(|t| t.event_id == event_id) {
            stats.total_tickets += 1;
            if ticket.checked_in {
                stats.checked_in += 1;
            }
        }
        for check_in in tables.check_ins.values().filter(|c| c.event_id == event_id) {
            match check_in.method {
                CheckInMethod::QrScan => stats.by_qr_scan += 1,
                CheckInMethod::Manual => stats.by_manual += 1,
            }
        }
        Ok(stats)
    }
}

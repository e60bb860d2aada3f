use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, TicketStore};
use crate::models::{
    CheckIn, CheckInAudit, CheckInStats, Event, NewCheckIn, NewTicket, Ticket, TicketSummary,
    TicketTier, UndoCheckIn, User, AUDIT_ACTION_UNDO,
};

const TICKET_COLUMNS: &str = "id, event_id, user_id, ticket_tier_id, token, checked_in, created_at";
const CHECK_IN_COLUMNS: &str =
    "id, ticket_id, event_id, staff_id, method, notes, checked_in_at";

/// PostgreSQL-backed store. Uniqueness and capacity rules are enforced by the
/// constraints in `migrations/`.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escapes `%`, `_` and `\` so user input is matched literally by `ILIKE`.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl TicketStore for PgTicketStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, organizer_id, title, description, location, start_time, end_time, \
             is_published, created_at, updated_at FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn find_tier(&self, id: Uuid) -> Result<Option<TicketTier>, StoreError> {
        let tier = sqlx::query_as::<_, TicketTier>(
            "SELECT id, event_id, name, description, price, total_quantity, available_quantity, \
             created_at, updated_at FROM ticket_tiers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tier)
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(tier_id) = ticket.ticket_tier_id {
            let reserved = sqlx::query_scalar::<_, Uuid>(
                "UPDATE ticket_tiers SET available_quantity = available_quantity - 1, \
                 updated_at = now() WHERE id = $1 AND available_quantity > 0 RETURNING id",
            )
            .bind(tier_id)
            .fetch_optional(&mut *tx)
            .await?;
            if reserved.is_none() {
                return Err(StoreError::CapacityExhausted(tier_id));
            }
        }

        let created = sqlx::query_as::<_, Ticket>(&format!(
            "INSERT INTO tickets (id, event_id, user_id, ticket_tier_id, token, checked_in, created_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, $6) RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket.id)
        .bind(ticket.event_id)
        .bind(ticket.user_id)
        .bind(ticket.ticket_tier_id)
        .bind(&ticket.token)
        .bind(ticket.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn cancel_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_as::<_, Ticket>(&format!(
            "DELETE FROM tickets WHERE id = $1 AND NOT checked_in RETURNING {TICKET_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(removed) = removed else {
            return Ok(None);
        };

        if let Some(tier_id) = removed.ticket_tier_id {
            sqlx::query(
                "UPDATE ticket_tiers SET available_quantity = LEAST(available_quantity + 1, total_quantity), \
                 updated_at = now() WHERE id = $1",
            )
            .bind(tier_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(removed))
    }

    async fn find_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn find_ticket_by_token(
        &self,
        id: Uuid,
        token: &str,
    ) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 AND token = $2"
        ))
        .bind(id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn find_check_in(&self, ticket_id: Uuid) -> Result<Option<CheckIn>, StoreError> {
        let check_in = sqlx::query_as::<_, CheckIn>(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM check_ins WHERE ticket_id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(check_in)
    }

    async fn insert_check_in(&self, check_in: NewCheckIn) -> Result<CheckIn, StoreError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, CheckIn>(&format!(
            "INSERT INTO check_ins (id, ticket_id, event_id, staff_id, method, notes, checked_in_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {CHECK_IN_COLUMNS}"
        ))
        .bind(check_in.id)
        .bind(check_in.ticket_id)
        .bind(check_in.event_id)
        .bind(check_in.staff_id)
        .bind(check_in.method)
        .bind(&check_in.notes)
        .bind(check_in.checked_in_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE tickets SET checked_in = TRUE WHERE id = $1")
            .bind(check_in.ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn undo_check_in(&self, undo: UndoCheckIn) -> Result<Option<CheckInAudit>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_as::<_, CheckIn>(&format!(
            "DELETE FROM check_ins WHERE ticket_id = $1 RETURNING {CHECK_IN_COLUMNS}"
        ))
        .bind(undo.ticket_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(removed) = removed else {
            return Ok(None);
        };

        sqlx::query("UPDATE tickets SET checked_in = FALSE WHERE id = $1")
            .bind(undo.ticket_id)
            .execute(&mut *tx)
            .await?;

        let audit = sqlx::query_as::<_, CheckInAudit>(
            "INSERT INTO check_in_audits \
             (id, ticket_id, event_id, action, actor_id, reason, check_in_method, checked_in_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, ticket_id, event_id, action, actor_id, reason, check_in_method, \
             checked_in_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(removed.ticket_id)
        .bind(removed.event_id)
        .bind(AUDIT_ACTION_UNDO)
        .bind(undo.actor_id)
        .bind(&undo.reason)
        .bind(removed.method)
        .bind(removed.checked_in_at)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(audit))
    }

    async fn search_tickets(
        &self,
        event_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<TicketSummary>, StoreError> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query_as::<_, TicketSummary>(
            "SELECT t.id AS ticket_id, t.event_id, t.user_id, t.ticket_tier_id, t.checked_in, \
             t.created_at, u.name AS attendee_name, u.email AS attendee_email, tt.name AS tier_name \
             FROM tickets t \
             JOIN users u ON u.id = t.user_id \
             LEFT JOIN ticket_tiers tt ON tt.id = t.ticket_tier_id \
             WHERE t.event_id = $1 \
               AND (u.name ILIKE $2 ESCAPE '\\' OR u.email ILIKE $2 ESCAPE '\\') \
             ORDER BY u.name ASC, t.created_at ASC \
             LIMIT $3",
        )
        .bind(event_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn check_in_stats(&self, event_id: Uuid) -> Result<CheckInStats, StoreError> {
        let stats = sqlx::query_as::<_, CheckInStats>(
            "SELECT COUNT(t.id) AS total_tickets, \
             COUNT(t.id) FILTER (WHERE t.checked_in) AS checked_in, \
             COUNT(c.id) FILTER (WHERE c.method = 'qr_scan') AS by_qr_scan, \
             COUNT(c.id) FILTER (WHERE c.method = 'manual') AS by_manual \
             FROM tickets t \
             LEFT JOIN check_ins c ON c.ticket_id = t.id \
             WHERE t.event_id = $1",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

//! Ticket confirmation e-mail.
//!
//! Delivery is best-effort: it runs after the ticket is committed and a
//! failure is logged, never propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone)]
pub struct TicketConfirmation {
    pub to: String,
    pub attendee_name: String,
    pub event_title: String,
    pub starts_at: DateTime<Utc>,
    pub ticket_id: Uuid,
    /// PNG data URI of the ticket's QR code, inlined in the message body.
    pub qr_data_uri: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_ticket_confirmation(&self, message: &TicketConfirmation)
        -> Result<(), MailError>;
}

/// Writes confirmations to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_ticket_confirmation(
        &self,
        message: &TicketConfirmation,
    ) -> Result<(), MailError> {
        info!(
            to = %message.to,
            attendee = %message.attendee_name,
            event = %message.event_title,
            starts_at = %message.starts_at,
            ticket_id = %message.ticket_id,
            qr_bytes = message.qr_data_uri.len(),
            "ticket confirmation e-mail"
        );
        Ok(())
    }
}

/// Sends one confirmation. Failures are logged and reported as `false`.
pub async fn deliver_confirmation(mailer: &dyn Mailer, message: &TicketConfirmation) -> bool {
    match mailer.send_ticket_confirmation(message).await {
        Ok(()) => true,
        Err(err) => {
            warn!(
                error = %err,
                ticket_id = %message.ticket_id,
                "ticket confirmation e-mail not delivered"
            );
            false
        }
    }
}

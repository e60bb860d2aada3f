use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;
use crate::ticketing::{CheckInError, CheckInOutcome, RsvpError};
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Wrong event: {0}")]
    WrongEvent(String),

    #[error("Already checked in")]
    AlreadyCheckedIn { message: String, details: Value },

    #[error("Not checked in: {0}")]
    NotCheckedIn(String),

    #[error("Sold out: {0}")]
    SoldOut(String),

    #[error("Already RSVPed: {0}")]
    AlreadyRsvped(String),

    #[error("Event not published: {0}")]
    EventNotPublished(String),

    #[error("Store error")]
    Store(#[from] StoreError),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::WrongEvent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyCheckedIn { .. } => StatusCode::CONFLICT,
            AppError::NotCheckedIn(_) => StatusCode::CONFLICT,
            AppError::SoldOut(_) => StatusCode::CONFLICT,
            AppError::AlreadyRsvped(_) => StatusCode::CONFLICT,
            AppError::EventNotPublished(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::WrongEvent(_) => "WRONG_EVENT",
            AppError::AlreadyCheckedIn { .. } => "ALREADY_CHECKED_IN",
            AppError::NotCheckedIn(_) => "NOT_CHECKED_IN",
            AppError::SoldOut(_) => "SOLD_OUT",
            AppError::AlreadyRsvped(_) => "ALREADY_RSVPED",
            AppError::EventNotPublished(_) => "EVENT_NOT_PUBLISHED",
            AppError::Store(_) => "STORE_UNAVAILABLE",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::AlreadyCheckedIn { message, .. } => {
                warn!(code = self.code(), message = %message, "Check-in rejected");
            }
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::WrongEvent(msg)
            | AppError::NotCheckedIn(msg)
            | AppError::SoldOut(msg)
            | AppError::AlreadyRsvped(msg)
            | AppError::EventNotPublished(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::Store(e) => {
                error!(error = ?e, "Store error");
            }
        }
    }
}

fn already_checked_in(existing: &CheckInOutcome) -> AppError {
    AppError::AlreadyCheckedIn {
        message: format!(
            "Already checked in at {}",
            existing.check_in.checked_in_at.to_rfc3339()
        ),
        details: serde_json::to_value(existing).unwrap_or(Value::Null),
    }
}

impl From<CheckInError> for AppError {
    fn from(err: CheckInError) -> Self {
        match err {
            CheckInError::MalformedInput(e) => AppError::ValidationError(e.to_string()),
            CheckInError::NotFound => AppError::NotFound("Invalid or expired code".to_string()),
            CheckInError::WrongEvent { .. } => {
                AppError::WrongEvent("Code does not belong to this event".to_string())
            }
            CheckInError::AlreadyCheckedIn(existing) => already_checked_in(&existing),
            CheckInError::NotCheckedIn => {
                AppError::NotCheckedIn("Ticket is not checked in".to_string())
            }
            CheckInError::TransientStore(e) => AppError::Store(e),
        }
    }
}

impl From<RsvpError> for AppError {
    fn from(err: RsvpError) -> Self {
        match err {
            RsvpError::EventNotFound => AppError::NotFound("Event not found".to_string()),
            RsvpError::TierNotFound => {
                AppError::NotFound("Ticket tier not found for this event".to_string())
            }
            RsvpError::TicketNotFound => AppError::NotFound("Ticket not found".to_string()),
            RsvpError::EventNotPublished => AppError::EventNotPublished(err.to_string()),
            RsvpError::SoldOut => AppError::SoldOut(err.to_string()),
            RsvpError::AlreadyRsvped => AppError::AlreadyRsvped(err.to_string()),
            RsvpError::AlreadyCheckedIn(Some(existing)) => already_checked_in(&existing),
            RsvpError::AlreadyCheckedIn(None) => AppError::AlreadyCheckedIn {
                message: err.to_string(),
                details: Value::Null,
            },
            RsvpError::Forbidden => AppError::Forbidden(err.to_string()),
            RsvpError::Encode(e) => AppError::InternalServerError(e.to_string()),
            RsvpError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let (public_message, details) = match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::WrongEvent(msg)
            | AppError::NotCheckedIn(msg)
            | AppError::SoldOut(msg)
            | AppError::AlreadyRsvped(msg)
            | AppError::EventNotPublished(msg) => (msg, None),
            AppError::AlreadyCheckedIn { message, details } => (message, Some(details)),
            AppError::Store(_) => ("The ticket store is temporarily unavailable".to_string(), None),
            AppError::InternalServerError(_) => ("An internal error occurred".to_string(), None),
        };

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckIn, CheckInMethod, Ticket};
    use crate::ticketing::CheckInOutcome;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_check_in_errors_map_to_statuses() {
        let cases = [
            (CheckInError::NotFound, StatusCode::NOT_FOUND),
            (
                CheckInError::WrongEvent {
                    expected: Uuid::new_v4(),
                    actual: Uuid::new_v4(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CheckInError::TransientStore(StoreError::Unavailable("down".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CheckInError::NotCheckedIn, StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_already_checked_in_carries_existing_record() {
        let ticket_id = Uuid::new_v4();
        let event_id = Uuid::new_v4();
        let now = Utc::now();
        let outcome = CheckInOutcome {
            ticket: Ticket {
                id: ticket_id,
                event_id,
                user_id: Uuid::new_v4(),
                ticket_tier_id: None,
                token: "abc".to_string(),
                checked_in: true,
                created_at: now,
            },
            check_in: CheckIn {
                id: Uuid::new_v4(),
                ticket_id,
                event_id,
                staff_id: Uuid::new_v4(),
                method: CheckInMethod::QrScan,
                notes: None,
                checked_in_at: now,
            },
        };

        let err = AppError::from(CheckInError::AlreadyCheckedIn(Box::new(outcome)));
        assert_eq!(err.code(), "ALREADY_CHECKED_IN");
        match err {
            AppError::AlreadyCheckedIn { details, .. } => {
                assert_eq!(details["check_in"]["method"], "qr_scan");
                assert_eq!(details["ticket"]["id"], ticket_id.to_string());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rsvp_errors_keep_distinct_codes() {
        let cases = [
            (RsvpError::SoldOut, StatusCode::CONFLICT, "SOLD_OUT"),
            (RsvpError::AlreadyRsvped, StatusCode::CONFLICT, "ALREADY_RSVPED"),
            (
                RsvpError::EventNotPublished,
                StatusCode::UNPROCESSABLE_ENTITY,
                "EVENT_NOT_PUBLISHED",
            ),
            (
                RsvpError::AlreadyCheckedIn(None),
                StatusCode::CONFLICT,
                "ALREADY_CHECKED_IN",
            ),
            (RsvpError::Forbidden, StatusCode::FORBIDDEN, "FORBIDDEN"),
        ];
        for (err, status, code) in cases {
            let err = AppError::from(err);
            assert_eq!(err.status_code(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_undo_without_check_in_has_its_own_code() {
        let err = AppError::from(CheckInError::NotCheckedIn);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "NOT_CHECKED_IN");
    }
}

//! RSVP → ticket → check-in lifecycle.

pub mod encoder;
pub mod payload;
pub mod rsvp;
pub mod search;
pub mod token;
pub mod validator;

pub use encoder::{EncodeError, RenderOptions, TicketEncoder};
pub use payload::{PayloadError, TicketPayload};
pub use rsvp::{IssuedTicket, RsvpError, RsvpService};
pub use search::{TicketSearch, DEFAULT_SEARCH_LIMIT};
pub use token::TokenIssuer;
pub use validator::{CheckInError, CheckInOutcome, CheckInValidator};

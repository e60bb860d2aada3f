pub mod check_in;
pub mod event;
pub mod ticket;
pub mod user;

pub use check_in::{
    CheckIn, CheckInAudit, CheckInMethod, CheckInStats, NewCheckIn, UndoCheckIn,
    AUDIT_ACTION_UNDO,
};
pub use event::Event;
pub use ticket::{NewTicket, Ticket, TicketSummary, TicketTier};
pub use user::User;

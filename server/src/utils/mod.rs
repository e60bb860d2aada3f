pub mod actor;
pub mod error;
pub mod response;
pub mod retry;

pub mod config;
pub mod email;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod scanner;
pub mod state;
pub mod stats;
pub mod store;
pub mod ticketing;
pub mod utils;

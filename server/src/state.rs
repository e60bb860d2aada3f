use std::sync::Arc;

use crate::config::Config;
use crate::email::Mailer;
use crate::store::TicketStore;
use crate::ticketing::{CheckInValidator, RsvpService, TicketEncoder, TicketSearch};
use crate::utils::retry::RetryPolicy;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub rsvps: Arc<RsvpService>,
    pub validator: Arc<CheckInValidator>,
    pub search: Arc<TicketSearch>,
    pub config: Arc<Config>,
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn TicketStore>, mailer: Arc<dyn Mailer>, config: Config) -> Self {
        Self {
            rsvps: Arc::new(RsvpService::new(
                Arc::clone(&store),
                TicketEncoder::default(),
                mailer,
            )),
            validator: Arc::new(CheckInValidator::new(Arc::clone(&store))),
            search: Arc::new(TicketSearch::new(Arc::clone(&store), config.search_limit)),
            store,
            config: Arc::new(config),
            retry: RetryPolicy::default(),
        }
    }
}

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::models::TicketSummary;
use crate::store::{StoreError, TicketStore};

pub const DEFAULT_SEARCH_LIMIT: i64 = 20;

/// Name/email lookup for attendees whose code cannot be scanned.
pub struct TicketSearch {
    store: Arc<dyn TicketStore>,
    limit: i64,
}

impl TicketSearch {
    pub fn new(store: Arc<dyn TicketStore>, limit: i64) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    /// Blank queries match nothing rather than listing the whole event.
    pub async fn search(
        &self,
        event_id: Uuid,
        query: &str,
    ) -> Result<Vec<TicketSummary>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let results = self
            .store
            .search_tickets(event_id, query, self.limit)
            .await?;
        debug!(event_id = %event_id, hits = results.len(), "ticket search");
        Ok(results)
    }
}

//! Fixed-interval polling of check-in statistics.
//!
//! The timer task belongs to the [`StatsPoller`] and is aborted when the
//! poller is dropped, so a viewer that goes away leaves nothing running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::CheckInStats;
use crate::store::TicketStore;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

pub struct StatsPoller {
    updates: watch::Receiver<Option<CheckInStats>>,
    task: JoinHandle<()>,
}

impl StatsPoller {
    pub fn spawn(store: Arc<dyn TicketStore>, event_id: Uuid, interval: Duration) -> Self {
        let (tx, updates) = watch::channel(None);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.check_in_stats(event_id).await {
                    Ok(stats) => {
                        tx.send_replace(Some(stats));
                    }
                    Err(err) => {
                        warn!(error = %err, event_id = %event_id, "stats refresh failed");
                    }
                }
            }
        });
        debug!(event_id = %event_id, interval_ms = interval.as_millis() as u64, "stats poller started");
        Self { updates, task }
    }

    /// Waits for the next successful refresh.
    pub async fn next(&mut self) -> Option<CheckInStats> {
        loop {
            self.updates.changed().await.ok()?;
            let latest = self.updates.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckInMethod, NewCheckIn, NewTicket};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_picks_up_new_check_ins() {
        let store = Arc::new(MemoryStore::new());
        let organizer = store.insert_user("Org", "org@example.com").await;
        let event = store.insert_event(organizer.id, "Meetup", true).await;
        let ticket = store
            .create_ticket(NewTicket {
                id: Uuid::new_v4(),
                event_id: event.id,
                user_id: organizer.id,
                ticket_tier_id: None,
                token: "t".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut poller = StatsPoller::spawn(store.clone(), event.id, TICK);
        let first = timeout(Duration::from_secs(5), poller.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.total_tickets, 1);
        assert_eq!(first.checked_in, 0);

        store
            .insert_check_in(NewCheckIn {
                id: Uuid::new_v4(),
                ticket_id: ticket.id,
                event_id: event.id,
                staff_id: organizer.id,
                method: CheckInMethod::QrScan,
                notes: None,
                checked_in_at: Utc::now(),
            })
            .await
            .unwrap();

        let updated = timeout(Duration::from_secs(5), async {
            loop {
                let stats = poller.next().await.unwrap();
                if stats.checked_in == 1 {
                    return stats;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(updated.by_qr_scan, 1);
        assert_eq!(*poller.updates.borrow(), Some(updated));
    }

    #[tokio::test]
    async fn test_drop_cancels_timer() {
        let store = Arc::new(MemoryStore::new());
        let poller = StatsPoller::spawn(store, Uuid::new_v4(), TICK);
        let task = poller.task.abort_handle();
        assert!(!task.is_finished());

        drop(poller);
        timeout(Duration::from_secs(5), async {
            while !task.is_finished() {
                tokio::time::sleep(TICK).await;
            }
        })
        .await
        .unwrap();
    }
}

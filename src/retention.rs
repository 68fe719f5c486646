//! Background retention sweeper: periodically purges sessions older than
//! the configured retention window. Grounded on the teacher's
//! `dashflow-streaming` `benchmark_runner`-style periodic-tick bin loops
//! (a `tokio::time::interval` driving a bounded unit of work), adapted here
//! to a spawned task living alongside the gateway rather than a one-shot
//! CLI invocation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::eventbus::EventBus;
use crate::store::SessionStore;

/// How often the sweeper wakes up to check for expired sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the sweeper as a background task. It runs until the process exits;
/// there is no cancellation handle because a sweep tick purges sessions
/// that are, by construction, already terminal and past their retention
/// window, so cutting it off mid-run loses nothing but a log line.
pub fn spawn(store: Arc<dyn SessionStore>, events: EventBus, retention_days: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick fires immediately; skip it so the sweeper doesn't
        // race application start-up before any session could plausibly be
        // expired.
        interval.tick().await;
        loop {
            interval.tick().await;
            sweep_once(store.as_ref(), &events, retention_days).await;
        }
    })
}

async fn sweep_once(store: &dyn SessionStore, events: &EventBus, retention_days: u32) {
    let expired = match store.list_expired_sessions(retention_days).await {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!(error = %err, "retention sweep: failed to list expired sessions");
            return;
        }
    };

    if expired.is_empty() {
        return;
    }

    tracing::info!(count = expired.len(), "retention sweep: purging expired sessions");
    for session_id in expired {
        if let Err(err) = store.purge_session(session_id).await {
            tracing::warn!(%session_id, error = %err, "retention sweep: failed to purge session");
            continue;
        }
        // A purged session has no further need for replay; drop its
        // fan-out channel along with its store record so the two never
        // drift (an orphaned channel would otherwise live until process
        // exit since `EventBus` never evicts on its own).
        events.remove_session(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn sweep_once_is_a_no_op_on_an_empty_store() {
        let store = InMemoryStore::new();
        let events = EventBus::new();
        sweep_once(&store, &events, 90).await;
    }
}

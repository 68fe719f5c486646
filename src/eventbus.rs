//! Live event fan-out: one broadcast channel plus a bounded replay buffer
//! per session, so a client that reconnects mid-interview can catch up
//! instead of silently missing events.
//!
//! Grounded on `dashflow-observability`'s `websocket_server` `ServerState`
//! and `ReplayBuffer` (a `VecDeque`-backed ring buffer keyed by a
//! monotonic id, paired with a `tokio::sync::broadcast` sender for live
//! subscribers), adapted from a single global feed to a `dashmap`-keyed
//! per-session registry.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Capacity of the broadcast channel. A subscriber more than this many
/// events behind the fastest publisher is dropped (`broadcast::Receiver`
/// surfaces this as `RecvError::Lagged`); the subscriber is expected to
/// reconnect and replay from [`EventBus::replay_since`].
const CHANNEL_CAPACITY: usize = 256;

/// How many past events each session retains for replay.
const REPLAY_BUFFER_CAPACITY: usize = 512;

/// A single fanned-out event: a state transition, a new question, a strike,
/// or any other fact the client needs to react to live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: u64,
    pub session_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

struct SessionChannel {
    sender: broadcast::Sender<SessionEvent>,
    replay: Mutex<VecDeque<SessionEvent>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl SessionChannel {
    fn new() -> Self {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            replay: Mutex::new(VecDeque::with_capacity(REPLAY_BUFFER_CAPACITY)),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

/// Per-session live event fan-out registry.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<DashMap<Uuid, Arc<SessionChannel>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    fn channel_for(&self, session_id: Uuid) -> Arc<SessionChannel> {
        self.channels
            .entry(session_id)
            .or_insert_with(|| Arc::new(SessionChannel::new()))
            .clone()
    }

    /// Publish `kind`/`payload` to every current subscriber of `session_id`
    /// and append it to the replay buffer. Never fails: if there are no
    /// subscribers the event is still buffered for later replay.
    pub async fn publish(&self, session_id: Uuid, kind: impl Into<String>, payload: serde_json::Value) {
        let channel = self.channel_for(session_id);
        let id = channel
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let event = SessionEvent {
            id,
            session_id,
            kind: kind.into(),
            payload,
            occurred_at: Utc::now(),
        };

        {
            let mut replay = channel.replay.lock().await;
            if replay.len() == REPLAY_BUFFER_CAPACITY {
                replay.pop_front();
            }
            replay.push_back(event.clone());
        }

        // A publish with zero subscribers returns `Err`; that's expected and
        // not a failure since the event is retained in the replay buffer.
        let _ = channel.sender.send(event);
    }

    /// Subscribe to live events for a session. Drop-slowest semantics: a
    /// receiver that falls more than [`CHANNEL_CAPACITY`] events behind
    /// observes a `Lagged` error on its next recv and should call
    /// [`EventBus::replay_since`] to resync.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<SessionEvent> {
        self.channel_for(session_id).sender.subscribe()
    }

    /// All buffered events with `id > since_id`, oldest first.
    pub async fn replay_since(&self, session_id: Uuid, since_id: u64) -> Vec<SessionEvent> {
        let channel = self.channel_for(session_id);
        let replay = channel.replay.lock().await;
        replay
            .iter()
            .filter(|e| e.id > since_id)
            .cloned()
            .collect()
    }

    pub fn remove_session(&self, session_id: Uuid) {
        self.channels.remove(&session_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_is_observed_by_subscriber() {
        let bus = EventBus::new();
        let session_id = Uuid::new_v4();
        let mut rx = bus.subscribe(session_id);
        bus.publish(session_id, "state_changed", serde_json::json!({"to": "active"}))
            .await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, "state_changed");
    }

    #[tokio::test]
    async fn replay_since_returns_only_newer_events() {
        let bus = EventBus::new();
        let session_id = Uuid::new_v4();
        bus.publish(session_id, "a", serde_json::json!(null)).await;
        bus.publish(session_id, "b", serde_json::json!(null)).await;
        bus.publish(session_id, "c", serde_json::json!(null)).await;

        let all = bus.replay_since(session_id, 0).await;
        assert_eq!(all.len(), 3);

        let since_first = bus.replay_since(session_id, all[0].id).await;
        assert_eq!(since_first.len(), 2);
        assert_eq!(since_first[0].kind, "b");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic_and_is_still_buffered() {
        let bus = EventBus::new();
        let session_id = Uuid::new_v4();
        bus.publish(session_id, "a", serde_json::json!(null)).await;
        let events = bus.replay_since(session_id, 0).await;
        assert_eq!(events.len(), 1);
    }
}

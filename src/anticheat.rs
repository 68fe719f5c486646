//! The anti-cheat event chain: a tamper-evident, strictly monotonic
//! per-session log of browser-reported environment events.
//!
//! Chain verification is grounded on the teacher's content-addressed hashing
//! idiom (`dashflow-registry/src/content_hash.rs`'s `ContentHash`): a fixed
//! canonical encoding, a collision-resistant digest, hex-encoded lower-case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Kinds of browser-reported environment events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    FsExit,
    FsReady,
    TabSwitch,
    FaceMissing,
    ScreenshotAttempt,
    MultiFace,
    BgVoice,
    Blur,
}

/// One event in the chain, as submitted by the browser (before the server
/// assigns nothing — `seq` and `prev_hash` are supplied by the client and
/// checked, not generated, since the chain's whole point is that the client
/// commits to its own history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCheatEventInput {
    pub seq: u64,
    pub prev_hash: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub details: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// A persisted, immutable anti-cheat event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCheatEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub seq: u64,
    pub prev_hash: String,
    pub event_type: EventType,
    pub details: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl AntiCheatEvent {
    fn from_input(session_id: Uuid, input: AntiCheatEventInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            seq: input.seq,
            prev_hash: input.prev_hash,
            event_type: input.event_type,
            details: input.details,
            ts: input.ts,
        }
    }

    /// Canonical encoding over `{sessionId, seq, type, details, ts,
    /// prevHash}` with stable field ordering, as required by spec.md §4.4.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let canonical = serde_json::json!({
            "sessionId": self.session_id,
            "seq": self.seq,
            "type": self.event_type,
            "details": self.details,
            "ts": self.ts,
            "prevHash": self.prev_hash,
        });
        // serde_json's map serialization preserves insertion order for
        // `serde_json::Value` built via `json!`, which is what makes this
        // byte sequence stable across calls.
        serde_json::to_vec(&canonical).expect("canonical value is always serializable")
    }

    /// Hex-encoded SHA-256 of [`Self::canonical_bytes`].
    pub fn canonical_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The `(seq, hash)` pair identifying the most recent accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTail {
    pub seq: u64,
    pub hash: String,
}

impl ChainTail {
    pub fn empty() -> Self {
        Self {
            seq: 0,
            hash: String::new(),
        }
    }
}

/// Verify a batch against the stored tail and return the fully-hydrated
/// events plus the new tail, without persisting anything. Rejects the whole
/// batch on any chain violation — callers must not partially apply it.
pub fn verify_batch(
    session_id: Uuid,
    tail: ChainTail,
    batch: Vec<AntiCheatEventInput>,
) -> Result<(Vec<AntiCheatEvent>, ChainTail)> {
    if batch.is_empty() {
        return Ok((Vec::new(), tail));
    }

    let mut events = Vec::with_capacity(batch.len());
    let mut expected_seq = tail.seq + 1;
    let mut expected_prev_hash = tail.hash.clone();

    for input in batch {
        if input.seq != expected_seq || input.prev_hash != expected_prev_hash {
            return Err(AppError::ChainBroken {
                tail_seq: tail.seq,
                tail_hash: tail.hash,
            });
        }
        let event = AntiCheatEvent::from_input(session_id, input);
        expected_prev_hash = event.canonical_hash();
        expected_seq += 1;
        events.push(event);
    }

    let new_tail = ChainTail {
        seq: expected_seq - 1,
        hash: expected_prev_hash,
    };
    Ok((events, new_tail))
}

/// Severity of a policy violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
}

/// What the engine did in response to a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeAction {
    None,
    Pause,
    End,
}

/// A derived record produced when an event matches a policy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strike {
    pub id: Uuid,
    pub session_id: Uuid,
    pub severity: Severity,
    pub event_type: EventType,
    pub triggering_seq: u64,
    pub action: StrikeAction,
    pub created_at: DateTime<Utc>,
}

impl Strike {
    pub fn new(
        session_id: Uuid,
        severity: Severity,
        event_type: EventType,
        triggering_seq: u64,
        action: StrikeAction,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            severity,
            event_type,
            triggering_seq,
            action,
            created_at: Utc::now(),
        }
    }
}

/// Evaluate newly-accepted events against the strike policy table, given
/// each rule's running occurrence count so far (rescinded occurrences are
/// decremented, never counted negative). `FACE_MISSING` and `BLUR` share
/// one combined-minor counter (spec.md §4.4's "auto-pause on 3rd minor");
/// every other rule counts its own event type. Returns one [`Strike`] per
/// event whose rule action is not [`StrikeAction::None`].
///
/// `counts` is mutated in place so the caller can persist it for the next
/// batch; this function has no side effects beyond that.
pub fn evaluate_batch(
    counts: &mut std::collections::HashMap<crate::policy::CounterKey, u32>,
    new_events: &[AntiCheatEvent],
) -> Vec<Strike> {
    let mut strikes = Vec::new();

    for event in new_events {
        for rule in crate::policy::STRIKE_RULES {
            if rule.rescinded_by == Some(event.event_type) {
                if let Some(pending) = counts.get_mut(&rule.counter_key()) {
                    *pending = pending.saturating_sub(1);
                }
            }
        }

        let Some(rule) = crate::policy::rule_for(event.event_type) else {
            continue;
        };
        let counter = counts.entry(rule.counter_key()).or_insert(0);
        *counter += 1;

        let action = if *counter >= rule.escalate_at {
            rule.escalated_action
        } else {
            rule.default_action
        };

        if action != StrikeAction::None {
            strikes.push(Strike::new(
                event.session_id,
                rule.severity,
                event.event_type,
                event.seq,
                action,
            ));
        }
    }

    strikes
}

/// The most severe action among a set of strikes (`End` beats `Pause` beats
/// `None`), used when a single batch produces more than one strike and the
/// caller must apply exactly one state transition.
pub fn most_severe_action(strikes: &[Strike]) -> StrikeAction {
    strikes
        .iter()
        .map(|s| s.action)
        .max_by_key(|a| match a {
            StrikeAction::None => 0,
            StrikeAction::Pause => 1,
            StrikeAction::End => 2,
        })
        .unwrap_or(StrikeAction::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64, prev_hash: &str, event_type: EventType) -> AntiCheatEventInput {
        AntiCheatEventInput {
            seq,
            prev_hash: prev_hash.to_string(),
            event_type,
            details: serde_json::Value::Null,
            ts: Utc::now(),
        }
    }

    #[test]
    fn first_event_requires_empty_prev_hash() {
        let session_id = Uuid::new_v4();
        let batch = vec![event(1, "", EventType::FsReady)];
        let (events, tail) = verify_batch(session_id, ChainTail::empty(), batch).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(tail.seq, 1);
        assert_eq!(tail.hash, events[0].canonical_hash());
    }

    #[test]
    fn chain_break_on_seq_gap_is_rejected_atomically() {
        let session_id = Uuid::new_v4();
        let first = event(1, "", EventType::FsReady);
        let (events, tail) =
            verify_batch(session_id, ChainTail::empty(), vec![first]).unwrap();
        let skip = event(3, &tail.hash, EventType::TabSwitch);
        let err = verify_batch(session_id, tail, vec![skip]).unwrap_err();
        match err {
            AppError::ChainBroken { tail_seq, .. } => assert_eq!(tail_seq, 1),
            other => panic!("expected ChainBroken, got {other:?}"),
        }
        let _ = events;
    }

    #[test]
    fn chain_break_on_hash_mismatch_is_rejected() {
        let session_id = Uuid::new_v4();
        let first = event(1, "", EventType::FsReady);
        let (_events, tail) = verify_batch(session_id, ChainTail::empty(), vec![first]).unwrap();
        let wrong = event(2, "deadbeef", EventType::TabSwitch);
        assert!(verify_batch(session_id, tail, vec![wrong]).is_err());
    }

    #[test]
    fn multi_event_batch_chains_internally() {
        let session_id = Uuid::new_v4();
        let e1 = event(1, "", EventType::FsReady);
        // seq 2's prevHash must equal hash(e1), computed relative to e1's
        // *own* seq, not known ahead of time in this test, so we build the
        // batch in two steps.
        let (first, tail1) = verify_batch(session_id, ChainTail::empty(), vec![e1]).unwrap();
        let e2 = event(2, &tail1.hash, EventType::Blur);
        let (second, tail2) = verify_batch(session_id, tail1, vec![e2]).unwrap();
        assert_eq!(tail2.seq, 2);
        assert_eq!(first.len() + second.len(), 2);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let session_id = Uuid::new_v4();
        let tail = ChainTail {
            seq: 5,
            hash: "abc".into(),
        };
        let (events, new_tail) = verify_batch(session_id, tail, Vec::new()).unwrap();
        assert!(events.is_empty());
        assert_eq!(new_tail, tail);
    }

    fn hydrate(session_id: Uuid, tail: &mut ChainTail, event_type: EventType) -> AntiCheatEvent {
        let input = event(tail.seq + 1, &tail.hash, event_type);
        let (mut events, new_tail) = verify_batch(session_id, *tail, vec![input]).unwrap();
        *tail = new_tail;
        events.pop().unwrap()
    }

    #[test]
    fn screenshot_attempt_ends_the_session_on_first_occurrence() {
        let session_id = Uuid::new_v4();
        let mut tail = ChainTail::empty();
        let event = hydrate(session_id, &mut tail, EventType::ScreenshotAttempt);

        let mut counts = std::collections::HashMap::new();
        let strikes = evaluate_batch(&mut counts, &[event]);
        assert_eq!(strikes.len(), 1);
        assert_eq!(strikes[0].action, StrikeAction::End);
        assert_eq!(most_severe_action(&strikes), StrikeAction::End);
    }

    #[test]
    fn face_missing_and_blur_share_the_combined_minor_threshold() {
        let session_id = Uuid::new_v4();
        let mut tail = ChainTail::empty();
        let e1 = hydrate(session_id, &mut tail, EventType::FaceMissing);
        let e2 = hydrate(session_id, &mut tail, EventType::Blur);
        let e3 = hydrate(session_id, &mut tail, EventType::FaceMissing);

        let mut counts = std::collections::HashMap::new();
        let mut strikes = evaluate_batch(&mut counts, &[e1]);
        assert!(strikes.is_empty());
        strikes.extend(evaluate_batch(&mut counts, &[e2]));
        assert!(strikes.is_empty());
        strikes.extend(evaluate_batch(&mut counts, &[e3]));
        assert_eq!(strikes.len(), 1, "the 3rd minor event of either type pauses");
        assert_eq!(strikes[0].action, StrikeAction::Pause);
    }

    #[test]
    fn fs_ready_rescinds_a_pending_fs_exit_pause() {
        let session_id = Uuid::new_v4();
        let mut tail = ChainTail::empty();
        let exit1 = hydrate(session_id, &mut tail, EventType::FsExit);
        let ready = hydrate(session_id, &mut tail, EventType::FsReady);
        let exit2 = hydrate(session_id, &mut tail, EventType::FsExit);

        let mut counts = std::collections::HashMap::new();
        let mut strikes = evaluate_batch(&mut counts, &[exit1]);
        assert_eq!(strikes[0].action, StrikeAction::Pause);
        strikes = evaluate_batch(&mut counts, &[ready]);
        assert!(strikes.is_empty());
        // FsReady decremented the FsExit counter, so this second exit is
        // back to a fresh "1st occurrence" and only pauses again rather
        // than ending the session.
        strikes = evaluate_batch(&mut counts, &[exit2]);
        assert_eq!(strikes[0].action, StrikeAction::Pause);
    }
}

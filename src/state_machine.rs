//! The session state machine: sole mutator of [`SessionState`]. Every
//! transition bumps the token generation (when it leaves `Active`) and fans
//! out the literal event kind spec.md names for it (`SESSION_PAUSED`,
//! `SESSION_RESUMED`, `SESSION_ENDED`, `SESSION_COMPLETED`), so the rest of
//! the system only ever observes committed state through the store or the
//! event bus, never by racing this module.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::anticheat::StrikeAction;
use crate::error::{AppError, Result};
use crate::eventbus::EventBus;
use crate::session::SessionState;
use crate::store::SessionStore;

/// Requests that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CompletePrecheck,
    Start,
    /// A strike's policy action. `End` always wins a race against
    /// `CompletePrecheck`/`Finalize` per spec.md §8's determinism property.
    ApplyStrikeAction(StrikeAction),
    Resume,
    Finalize,
}

/// Drives [`SessionState`] transitions and their side effects.
pub struct StateMachine {
    store: Arc<dyn SessionStore>,
    events: EventBus,
}

impl StateMachine {
    pub fn new(store: Arc<dyn SessionStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// The state a `from` state moves to under `transition`, or `None` if
    /// the transition is not legal from `from`. This table is spec.md
    /// §4.3's transition table made explicit.
    ///
    /// One entry is not in that table: `(Completed, ApplyStrikeAction(End))`.
    /// It exists solely to satisfy spec.md §8's race-determinism property —
    /// a finalize racing a major strike must always leave the session
    /// `Ended`, regardless of which one's `set_state` call lands first. If
    /// the strike lands first the session is already `Ended` and this arm
    /// is never reached; if finalize lands first, the session is briefly
    /// `Completed` and the strike's own transition collapses it to `Ended`
    /// instead of being rejected as "already terminal".
    fn target_state(from: SessionState, transition: Transition) -> Option<SessionState> {
        use SessionState::*;
        use Transition::*;
        match (from, transition) {
            (PendingPrecheck, CompletePrecheck) => Some(Ready),
            (Ready, Start) => Some(Active),
            (Active, ApplyStrikeAction(StrikeAction::Pause)) => Some(Paused),
            (Active, ApplyStrikeAction(StrikeAction::End)) => Some(Ended),
            (Active, Finalize) => Some(Completed),
            (Paused, Resume) => Some(Active),
            (Paused, ApplyStrikeAction(StrikeAction::End)) => Some(Ended),
            (Completed, ApplyStrikeAction(StrikeAction::End)) => Some(Ended),
            _ => None,
        }
    }

    /// The literal spec.md event kind fanned out for `transition` landing on
    /// `target`. `Ready → Active` (the lazily-triggered `Start`) has no event
    /// of its own in spec.md's event-kind list — the client learns of it via
    /// the `QUESTION_CREATED` that accompanies it — so it is distinguished
    /// from `Paused → Active` (`Resume`), which does get one.
    fn event_kind_for(transition: Transition, target: SessionState) -> Option<&'static str> {
        use SessionState::*;
        use Transition::*;
        match (transition, target) {
            (_, Paused) => Some("SESSION_PAUSED"),
            (Resume, Active) => Some("SESSION_RESUMED"),
            (_, Ended) => Some("SESSION_ENDED"),
            (Finalize, Completed) => Some("SESSION_COMPLETED"),
            _ => None,
        }
    }

    /// Attempt `transition` on `session_id`. On success, bumps the token
    /// generation whenever the session leaves `Active` (Pause, End,
    /// Complete) — which `TokenAuthority::verify` only enforces for AIPT/UPT
    /// (spec.md §4.3), so outstanding IST/WST/ACET remain valid across a
    /// pause — and, where spec.md names one, fans out the literal event kind
    /// for the transition.
    pub async fn apply(&self, session_id: Uuid, transition: Transition) -> Result<SessionState> {
        let session = self.store.get_session(session_id).await?;

        // No blanket "already terminal" bail here: `target_state` itself
        // encodes which transitions remain legal once terminal (only the
        // `Completed -> Ended` tie-break above), so the terminal check lives
        // in one place instead of two that could disagree.
        let target = Self::target_state(session.state, transition).ok_or_else(|| {
            AppError::InvalidState(format!(
                "cannot apply {transition:?} from state {:?}",
                session.state
            ))
        })?;

        self.store.set_state(session_id, target).await?;

        let leaves_active = matches!(session.state, SessionState::Active)
            && !matches!(target, SessionState::Active);
        if leaves_active {
            self.store.bump_token_generation(session_id).await?;
        }

        if let Some(kind) = Self::event_kind_for(transition, target) {
            self.events
                .publish(session_id, kind, json!({ "from": session.state, "to": target }))
                .await;
        }

        Ok(target)
    }
}

//! Authoritative session store.
//!
//! `SessionStore` is the seam a SQL-backed implementation would sit behind
//! (see DESIGN.md); `InMemoryStore` is the only implementation this
//! repository ships, grounded on the teacher's `dashmap`-keyed concurrent
//! maps (`dashflow-registry/src/storage.rs`'s `PackageStorage`) plus a
//! per-session `tokio::Mutex` for the operations that must serialize (the
//! teacher's storage layer relies on `dashmap`'s per-shard locking alone
//! since packages are append-only; sessions additionally need atomic
//! check-and-mutate across several fields, hence the extra per-session lock).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::anticheat::{AntiCheatEvent, AntiCheatEventInput, ChainTail, Strike};
use crate::answer::Answer;
use crate::error::{AppError, Result};
use crate::question::{Question, QuestionDraft};
use crate::session::{Session, SessionState};
use crate::summary::Summary;

/// Everything held for one session besides the `Session` record itself.
#[derive(Debug, Default)]
struct SessionRecord {
    session: Option<Session>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    anti_cheat_events: Vec<AntiCheatEvent>,
    strikes: Vec<Strike>,
    summary: Option<Summary>,
    /// Running per-rule occurrence count fed to
    /// `crate::anticheat::evaluate_batch`, persisted across calls so
    /// escalation and rescission see the session's whole history.
    event_type_counts: HashMap<crate::policy::CounterKey, u32>,
}

/// Persistence seam for everything session-scoped.
///
/// Every mutating method takes the session-level lock internally and is
/// therefore safe to call concurrently for the same session; callers never
/// need to coordinate locking themselves.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<()>;
    async fn get_session(&self, id: Uuid) -> Result<Session>;

    /// Assign the next gapless ordinal and persist the question atomically
    /// with bumping `asked_count`.
    async fn append_question(&self, session_id: Uuid, draft: QuestionDraft) -> Result<Question>;

    async fn append_answer(&self, answer: Answer) -> Result<()>;

    /// Atomically verify and append a batch of anti-cheat events, evaluate
    /// the strike policy against the session's running occurrence counts,
    /// persist any resulting strikes, and return the hydrated events, the
    /// new chain tail, and the strikes derived from this batch (in batch
    /// order) for the caller to hand to the state machine.
    async fn append_anti_cheat_batch(
        &self,
        session_id: Uuid,
        batch: Vec<AntiCheatEventInput>,
    ) -> Result<(Vec<AntiCheatEvent>, ChainTail, Vec<Strike>)>;

    async fn record_strike(&self, strike: Strike) -> Result<()>;
    async fn list_strikes(&self, session_id: Uuid) -> Result<Vec<Strike>>;
    async fn list_questions(&self, session_id: Uuid) -> Result<Vec<Question>>;
    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<Answer>>;

    /// Replace the session's state. Rejected if the current state is
    /// terminal; the state machine is responsible for transition legality,
    /// this only enforces the append-only/terminal invariant.
    async fn set_state(&self, session_id: Uuid, new_state: SessionState) -> Result<()>;

    async fn bump_token_generation(&self, session_id: Uuid) -> Result<u64>;

    /// Idempotent: writing the same summary twice is a no-op, writing a
    /// different one once a summary exists is rejected.
    async fn write_summary(&self, session_id: Uuid, summary: Summary) -> Result<()>;
    async fn get_summary(&self, session_id: Uuid) -> Result<Option<Summary>>;

    /// Sessions whose `ended_at` (or `created_at`, if never ended) is older
    /// than `older_than_days`, for the retention sweeper.
    async fn list_expired_sessions(&self, older_than_days: u32) -> Result<Vec<Uuid>>;
    async fn purge_session(&self, session_id: Uuid) -> Result<()>;
}

/// In-memory `SessionStore`. Data does not survive a process restart; this
/// is acceptable for this repository's scope (see DESIGN.md).
pub struct InMemoryStore {
    records: DashMap<Uuid, Arc<Mutex<SessionRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    fn record_for(&self, session_id: Uuid) -> Arc<Mutex<SessionRecord>> {
        self.records
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(SessionRecord::default())))
            .clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        let record = self.record_for(session.id);
        let mut guard = record.lock().await;
        if guard.session.is_some() {
            return Err(AppError::AlreadyExists(format!(
                "session {} already exists",
                session.id
            )));
        }
        guard.session = Some(session);
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Session> {
        let record = self.record_for(id);
        let guard = record.lock().await;
        guard
            .session
            .clone()
            .ok_or_else(|| AppError::NotFound(format!("session {id}")))
    }

    async fn append_question(&self, session_id: Uuid, draft: QuestionDraft) -> Result<Question> {
        let record = self.record_for(session_id);
        let mut guard = record.lock().await;
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

        if session.state.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "cannot append a question to a session in {:?}",
                session.state
            )));
        }
        if session.asked_count >= session.config.question_count {
            return Err(AppError::InvalidState(
                "question_count already reached".into(),
            ));
        }

        let ordinal = session.asked_count + 1;
        let question = Question::from_draft(session_id, ordinal, draft);
        session.asked_count = ordinal;
        guard.questions.push(question.clone());
        Ok(question)
    }

    async fn append_answer(&self, answer: Answer) -> Result<()> {
        let record = self.record_for(answer.session_id);
        let mut guard = record.lock().await;

        if !guard
            .questions
            .iter()
            .any(|q| q.id == answer.question_id)
        {
            return Err(AppError::NotFound(format!(
                "question {}",
                answer.question_id
            )));
        }

        if guard
            .answers
            .iter()
            .any(|a| a.question_id == answer.question_id)
        {
            return Err(AppError::AlreadyExists(format!(
                "an answer already exists for question {}",
                answer.question_id
            )));
        }

        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| AppError::NotFound(format!("session {}", answer.session_id)))?;
        session.answered_count += 1;
        guard.answers.push(answer);
        Ok(())
    }

    async fn append_anti_cheat_batch(
        &self,
        session_id: Uuid,
        batch: Vec<AntiCheatEventInput>,
    ) -> Result<(Vec<AntiCheatEvent>, ChainTail, Vec<Strike>)> {
        let record = self.record_for(session_id);
        let mut guard = record.lock().await;
        let session = guard
            .session
            .as_ref()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

        // `Ended` rejects outright (spec.md §4.4 rule 1). `Completed` is
        // deliberately still accepted: spec.md §8's race-determinism
        // property requires a major strike racing a finalize to resolve to
        // `Ended` even when the finalize's own `Completed` write lands first
        // under the per-session lock. Letting this batch through lets the
        // resulting strike's transition collapse `Completed` to `Ended` (see
        // `state_machine::StateMachine::target_state`'s
        // `(Completed, ApplyStrikeAction(End))` arm); any other strike
        // action computed against an already-`Completed` session simply
        // fails to transition and the events/strike still land, same as any
        // other already-decided batch.
        if session.state == SessionState::Ended {
            return Err(AppError::InvalidState(format!(
                "cannot append anti-cheat events to a session in {:?}",
                session.state
            )));
        }

        let tail = ChainTail {
            seq: session.tail_seq,
            hash: session.tail_hash.clone(),
        };
        let (events, new_tail) = crate::anticheat::verify_batch(session_id, tail, batch)?;

        guard.anti_cheat_events.extend(events.clone());
        let strikes = crate::anticheat::evaluate_batch(&mut guard.event_type_counts, &events);
        guard.strikes.extend(strikes.clone());

        let session = guard.session.as_mut().expect("checked above");
        session.tail_seq = new_tail.seq;
        session.tail_hash.clone_from(&new_tail.hash);
        for strike in &strikes {
            match strike.severity {
                crate::anticheat::Severity::Minor => session.strike_minor_count += 1,
                crate::anticheat::Severity::Major => session.strike_major_count += 1,
            }
        }

        Ok((events, new_tail, strikes))
    }

    async fn record_strike(&self, strike: Strike) -> Result<()> {
        let record = self.record_for(strike.session_id);
        let mut guard = record.lock().await;
        guard.strikes.push(strike);
        Ok(())
    }

    async fn list_strikes(&self, session_id: Uuid) -> Result<Vec<Strike>> {
        let record = self.record_for(session_id);
        let guard = record.lock().await;
        Ok(guard.strikes.clone())
    }

    async fn list_questions(&self, session_id: Uuid) -> Result<Vec<Question>> {
        let record = self.record_for(session_id);
        let guard = record.lock().await;
        Ok(guard.questions.clone())
    }

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<Answer>> {
        let record = self.record_for(session_id);
        let guard = record.lock().await;
        Ok(guard.answers.clone())
    }

    async fn set_state(&self, session_id: Uuid, new_state: SessionState) -> Result<()> {
        let record = self.record_for(session_id);
        let mut guard = record.lock().await;
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

        // Terminal sessions reject further writes, with one narrow
        // exception: `Completed -> Ended`. That collapse is how the state
        // machine resolves a finalize racing a major strike (spec.md §8) —
        // see `state_machine::StateMachine::target_state` for why this is
        // the only transition ever requested out of a terminal state.
        let is_tiebreak_override =
            session.state == SessionState::Completed && new_state == SessionState::Ended;
        if session.state.is_terminal() && !is_tiebreak_override {
            return Err(AppError::InvalidState(format!(
                "session {session_id} is already in terminal state {:?}",
                session.state
            )));
        }

        session.state = new_state;
        match new_state {
            SessionState::Active if session.started_at.is_none() => {
                session.started_at = Some(Utc::now());
            }
            SessionState::Completed | SessionState::Ended => {
                session.ended_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    async fn bump_token_generation(&self, session_id: Uuid) -> Result<u64> {
        let record = self.record_for(session_id);
        let mut guard = record.lock().await;
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;
        session.token_generation += 1;
        Ok(session.token_generation)
    }

    async fn write_summary(&self, session_id: Uuid, summary: Summary) -> Result<()> {
        let record = self.record_for(session_id);
        let mut guard = record.lock().await;
        match &guard.summary {
            None => {
                guard.summary = Some(summary);
                Ok(())
            }
            Some(existing) if existing.overall_score == summary.overall_score => Ok(()),
            Some(_) => Err(AppError::AlreadyExists(format!(
                "summary already written for session {session_id}"
            ))),
        }
    }

    async fn get_summary(&self, session_id: Uuid) -> Result<Option<Summary>> {
        let record = self.record_for(session_id);
        let guard = record.lock().await;
        Ok(guard.summary.clone())
    }

    async fn list_expired_sessions(&self, older_than_days: u32) -> Result<Vec<Uuid>> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let mut expired = Vec::new();
        for entry in self.records.iter() {
            let guard = entry.value().lock().await;
            if let Some(session) = &guard.session {
                let reference = session.ended_at.unwrap_or(session.created_at);
                if reference < cutoff {
                    expired.push(session.id);
                }
            }
        }
        Ok(expired)
    }

    async fn purge_session(&self, session_id: Uuid) -> Result<()> {
        self.records.remove(&session_id);
        Ok(())
    }
}

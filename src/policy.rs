//! Declarative anti-cheat strike policy and rubric scoring weights.
//!
//! Grounded on the teacher's preference for data tables over per-variant
//! dispatch (the trust-score weighting in `dashflow-registry/src/trust.rs`
//! reads a fixed table rather than matching on package kind); the engine and
//! AI Proxy look rules up here instead of hard-coding a match arm per event.

use crate::anticheat::{EventType, Severity, StrikeAction};

/// Which running counter a rule's `escalate_at` is measured against.
/// `FACE_MISSING` and `BLUR` share one "3rd minor" counter per spec.md
/// §4.4's table (both rows read "auto-pause on 3rd minor", not "3rd of
/// its own type"); every major-severity rule counts its own event type
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterScope {
    PerEventType,
    CombinedMinor,
}

/// One row of the strike table: what happens the `nth` time `event_type`
/// occurs in a session, and whether it can be rescinded by a later event.
#[derive(Debug, Clone, Copy)]
pub struct StrikeRule {
    pub event_type: EventType,
    pub severity: Severity,
    /// 1-based occurrence count (against `scope`'s counter) at which
    /// `escalated_action` fires. Every occurrence before that fires
    /// `default_action`.
    pub escalate_at: u32,
    pub default_action: StrikeAction,
    pub escalated_action: StrikeAction,
    /// An event type whose arrival cancels a pending pause caused by this
    /// rule (e.g. `FsReady` cancels a `FsExit`-triggered pause countdown).
    pub rescinded_by: Option<EventType>,
    pub scope: CounterScope,
}

/// The full strike table, per spec.md §4.4.
pub const STRIKE_RULES: &[StrikeRule] = &[
    StrikeRule {
        event_type: EventType::FaceMissing,
        severity: Severity::Minor,
        escalate_at: 3,
        default_action: StrikeAction::None,
        escalated_action: StrikeAction::Pause,
        rescinded_by: None,
        scope: CounterScope::CombinedMinor,
    },
    StrikeRule {
        event_type: EventType::Blur,
        severity: Severity::Minor,
        escalate_at: 3,
        default_action: StrikeAction::None,
        escalated_action: StrikeAction::Pause,
        rescinded_by: None,
        scope: CounterScope::CombinedMinor,
    },
    StrikeRule {
        event_type: EventType::FsExit,
        severity: Severity::Major,
        escalate_at: 2,
        default_action: StrikeAction::Pause,
        escalated_action: StrikeAction::End,
        rescinded_by: Some(EventType::FsReady),
        scope: CounterScope::PerEventType,
    },
    StrikeRule {
        event_type: EventType::TabSwitch,
        severity: Severity::Major,
        escalate_at: 2,
        default_action: StrikeAction::None,
        escalated_action: StrikeAction::End,
        rescinded_by: None,
        scope: CounterScope::PerEventType,
    },
    StrikeRule {
        event_type: EventType::ScreenshotAttempt,
        severity: Severity::Major,
        // "auto-end on 1st": the very first occurrence already meets the
        // threshold, so `default_action` (what a below-threshold
        // occurrence would do) is unreachable here.
        escalate_at: 1,
        default_action: StrikeAction::Pause,
        escalated_action: StrikeAction::End,
        rescinded_by: None,
        scope: CounterScope::PerEventType,
    },
    StrikeRule {
        event_type: EventType::MultiFace,
        severity: Severity::Major,
        escalate_at: 1,
        default_action: StrikeAction::Pause,
        escalated_action: StrikeAction::End,
        rescinded_by: None,
        scope: CounterScope::PerEventType,
    },
    StrikeRule {
        event_type: EventType::BgVoice,
        severity: Severity::Major,
        escalate_at: 2,
        default_action: StrikeAction::None,
        escalated_action: StrikeAction::End,
        rescinded_by: None,
        scope: CounterScope::PerEventType,
    },
];

/// Countdown, in seconds, the candidate has to resolve an `FsExit` pause
/// (by re-entering fullscreen, triggering `FsReady`) before it auto-escalates
/// to `End` regardless of occurrence count.
pub const FS_EXIT_COUNTDOWN_SECONDS: u64 = 10;

pub fn rule_for(event_type: EventType) -> Option<&'static StrikeRule> {
    STRIKE_RULES.iter().find(|r| r.event_type == event_type)
}

/// The running-count bucket a rule's occurrences are tallied against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKey {
    EventType(EventType),
    CombinedMinor,
}

impl StrikeRule {
    pub fn counter_key(&self) -> CounterKey {
        match self.scope {
            CounterScope::PerEventType => CounterKey::EventType(self.event_type),
            CounterScope::CombinedMinor => CounterKey::CombinedMinor,
        }
    }
}

/// Rubric dimensions and their scoring weight, summing to 1.0. Looked up by
/// the AI Proxy's summary generator rather than hard-coded per call site.
#[derive(Debug, Clone, Copy)]
pub struct RubricWeight {
    pub dimension: &'static str,
    pub weight: f64,
}

pub const RUBRIC_WEIGHTS: &[RubricWeight] = &[
    RubricWeight {
        dimension: "communication",
        weight: 0.25,
    },
    RubricWeight {
        dimension: "technical_accuracy",
        weight: 0.35,
    },
    RubricWeight {
        dimension: "problem_solving",
        weight: 0.25,
    },
    RubricWeight {
        dimension: "confidence",
        weight: 0.15,
    },
];

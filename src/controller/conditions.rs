//! Status condition management
//!
//! Conditions are keyed by type. Replacing a condition only moves its
//! `lastTransitionTime` when the status actually changes, so readers can tell
//! how long a condition has held.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::controller::error::Error;
use crate::crd::{Condition, ConditionStatus};

/// Standard condition types
pub mod condition_types {
    /// The object has converged
    pub const READY: &str = "Ready";
}

pub const READY_REASON: &str = "Ready";

/// Format a timestamp the way the API server does (`2024-01-02T03:04:05Z`)
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_time(time: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(time)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Replace or append a condition by type
///
/// `condition.last_transition_time` is used when the status changes (or the
/// type is new); otherwise the stored time is kept. Returns true when the list
/// changed.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.status != condition.status => {
            *existing = condition;
            true
        }
        Some(existing) => {
            let updated = Condition {
                last_transition_time: existing.last_transition_time.clone(),
                ..condition
            };
            let changed = *existing != updated;
            *existing = updated;
            changed
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
    now: DateTime<Utc>,
}

impl ConditionBuilder {
    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
            now: Utc::now(),
        }
    }

    /// Stamp transitions with `now` instead of the wall clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(
        mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> Self {
        set_condition(
            &mut self.conditions,
            Condition {
                type_: type_.to_string(),
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: format_time(self.now),
                observed_generation: self.generation,
            },
        );
        self
    }

    /// Copy a condition from another object, keeping its transition time
    /// and stamping this object's generation
    pub fn mirror(mut self, source: &Condition) -> Self {
        set_condition(
            &mut self.conditions,
            Condition {
                observed_generation: self.generation,
                ..source.clone()
            },
        );
        self
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Builder for the composite `Ready` condition
///
/// Starts out `False` with reason `Unknown`. A `True` status always carries
/// reason and message `Ready`.
pub struct ReadyConditionBuilder {
    status: ConditionStatus,
    reason: String,
    message: String,
    generation: Option<i64>,
}

impl ReadyConditionBuilder {
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            status: ConditionStatus::False,
            reason: "Unknown".to_string(),
            message: String::new(),
            generation,
        }
    }

    pub fn with_status(mut self, status: ConditionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    /// `False` with the error's reason and message
    pub fn with_error(self, error: &Error) -> Self {
        self.with_status(ConditionStatus::False)
            .with_reason(error.reason())
            .with_message(&error.to_string())
    }

    pub fn build(self, now: DateTime<Utc>) -> Condition {
        let (reason, message) = if self.status == ConditionStatus::True {
            (READY_REASON.to_string(), READY_REASON.to_string())
        } else {
            (self.reason, self.message)
        };
        Condition {
            type_: condition_types::READY.to_string(),
            status: self.status,
            reason,
            message,
            last_transition_time: format_time(now),
            observed_generation: self.generation,
        }
    }
}

//! Task lifecycle phases and TTL arithmetic
//!
//! A task has no stored phase; it is derived from its conditions:
//!
//! ```text
//! Pending -> Initialized -> Running -> Succeeded | Failed -> (deleted after TTL)
//!                 \____________\________ Canceled (also marks Failed unless Succeeded)
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::controller::conditions::{find_condition, is_true, parse_time};
use crate::crd::{Condition, ConditionStatus, task_conditions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskPhase {
    Pending,
    Initialized,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskPhase {
    pub fn from_conditions(conditions: &[Condition]) -> Self {
        if is_true(conditions, task_conditions::CANCELED) {
            TaskPhase::Canceled
        } else if is_true(conditions, task_conditions::SUCCEEDED) {
            TaskPhase::Succeeded
        } else if is_true(conditions, task_conditions::FAILED) {
            TaskPhase::Failed
        } else if is_true(conditions, task_conditions::STARTED) {
            TaskPhase::Running
        } else if is_true(conditions, task_conditions::INITIALIZED) {
            TaskPhase::Initialized
        } else {
            TaskPhase::Pending
        }
    }

    /// No further transitions except expiry
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Succeeded | TaskPhase::Failed | TaskPhase::Canceled
        )
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPhase::Pending => write!(f, "Pending"),
            TaskPhase::Initialized => write!(f, "Initialized"),
            TaskPhase::Running => write!(f, "Running"),
            TaskPhase::Succeeded => write!(f, "Succeeded"),
            TaskPhase::Failed => write!(f, "Failed"),
            TaskPhase::Canceled => write!(f, "Canceled"),
        }
    }
}

/// When the task finished: the latest transition of a true Succeeded or
/// Failed condition
pub fn completion_time(conditions: &[Condition]) -> Option<DateTime<Utc>> {
    [task_conditions::SUCCEEDED, task_conditions::FAILED]
        .into_iter()
        .filter_map(|type_| find_condition(conditions, type_))
        .filter(|c| c.status == ConditionStatus::True)
        .filter_map(|c| parse_time(&c.last_transition_time))
        .max()
}

fn expiry(completion: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    completion
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// True once `now` is past `completion + ttl`
pub fn is_expired(completion: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now > expiry(completion, ttl)
}

/// Delay until `completion + ttl`, zero if already reached
pub fn requeue_after(completion: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> Duration {
    (expiry(completion, ttl) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

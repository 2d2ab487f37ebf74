//! Unit tests for condition handling and task phase derivation

use std::time::Duration;

use chrono::{TimeZone, Utc};

use cf_controllers::controller::conditions::{
    ConditionBuilder, ReadyConditionBuilder, format_time, parse_time, set_condition,
};
use cf_controllers::controller::task_phase::{completion_time, is_expired, requeue_after};
use cf_controllers::controller::{Error, TaskPhase};
use cf_controllers::crd::{ConditionStatus, task_conditions};

use crate::common::*;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

mod condition_tests {
    use super::*;

    #[test]
    fn test_time_format() {
        assert_eq!(format_time(t0()), "2024-01-02T03:04:05Z");
        assert_eq!(parse_time("2024-01-02T03:04:05Z"), Some(t0()));
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn test_unchanged_status_keeps_transition_time() {
        let mut conditions = vec![condition("Ready", ConditionStatus::True, t0())];
        let later = t0() + chrono::TimeDelta::hours(1);

        let mut update = condition("Ready", ConditionStatus::True, later);
        update.message = "still fine".to_string();
        assert!(set_condition(&mut conditions, update));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, format_time(t0()));
        assert_eq!(conditions[0].message, "still fine");
    }

    #[test]
    fn test_status_change_moves_transition_time() {
        let mut conditions = vec![condition("Ready", ConditionStatus::True, t0())];
        let later = t0() + chrono::TimeDelta::hours(1);

        set_condition(
            &mut conditions,
            condition("Ready", ConditionStatus::False, later),
        );

        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert_eq!(conditions[0].last_transition_time, format_time(later));
    }

    #[test]
    fn test_identical_condition_is_not_a_change() {
        let mut conditions = vec![condition("Ready", ConditionStatus::True, t0())];
        assert!(!set_condition(
            &mut conditions,
            condition("Ready", ConditionStatus::True, t0())
        ));
    }

    #[test]
    fn test_builder_stamps_generation_and_time() {
        let conditions = ConditionBuilder::from_existing(Vec::new(), Some(3))
            .at(t0())
            .set_condition("Initialized", ConditionStatus::True, "Done", "")
            .build();

        assert_eq!(conditions[0].observed_generation, Some(3));
        assert_eq!(conditions[0].last_transition_time, format_time(t0()));
    }

    #[test]
    fn test_mirror_keeps_source_time() {
        let source = condition("Started", ConditionStatus::True, t0());
        let conditions = ConditionBuilder::from_existing(Vec::new(), Some(7))
            .at(t0() + chrono::TimeDelta::minutes(5))
            .mirror(&source)
            .build();

        assert_eq!(conditions[0].last_transition_time, source.last_transition_time);
        assert_eq!(conditions[0].observed_generation, Some(7));
    }

    #[test]
    fn test_ready_builder() {
        let ready = ReadyConditionBuilder::new(Some(2))
            .with_status(ConditionStatus::True)
            .with_reason("Ignored")
            .build(t0());
        assert_eq!(ready.type_, "Ready");
        assert_eq!(ready.reason, "Ready");
        assert_eq!(ready.observed_generation, Some(2));

        let pending = ReadyConditionBuilder::new(Some(2)).build(t0());
        assert_eq!(pending.status, ConditionStatus::False);
        assert_eq!(pending.reason, "Unknown");

        let failed = ReadyConditionBuilder::new(Some(2))
            .with_error(&Error::NotReady("waiting".to_string()))
            .build(t0());
        assert_eq!(failed.status, ConditionStatus::False);
        assert!(failed.message.contains("waiting"));
    }
}

mod phase_tests {
    use super::*;

    #[test]
    fn test_phase_precedence() {
        let mut conditions = vec![condition(task_conditions::INITIALIZED, ConditionStatus::True, t0())];
        assert_eq!(TaskPhase::from_conditions(&conditions), TaskPhase::Initialized);

        conditions.push(condition(task_conditions::STARTED, ConditionStatus::True, t0()));
        assert_eq!(TaskPhase::from_conditions(&conditions), TaskPhase::Running);
        assert!(!TaskPhase::Running.is_terminal());

        conditions.push(condition(task_conditions::FAILED, ConditionStatus::True, t0()));
        assert_eq!(TaskPhase::from_conditions(&conditions), TaskPhase::Failed);

        conditions.push(condition(task_conditions::CANCELED, ConditionStatus::True, t0()));
        assert_eq!(TaskPhase::from_conditions(&conditions), TaskPhase::Canceled);
        assert!(TaskPhase::Canceled.is_terminal());
    }

    #[test]
    fn test_false_conditions_do_not_advance_phase() {
        let conditions = vec![condition(task_conditions::SUCCEEDED, ConditionStatus::False, t0())];
        assert_eq!(TaskPhase::from_conditions(&conditions), TaskPhase::Pending);
        assert_eq!(completion_time(&conditions), None);
    }

    #[test]
    fn test_completion_is_latest_terminal_transition() {
        let later = t0() + chrono::TimeDelta::seconds(30);
        let conditions = vec![
            condition(task_conditions::SUCCEEDED, ConditionStatus::True, t0()),
            condition(task_conditions::FAILED, ConditionStatus::True, later),
        ];
        assert_eq!(completion_time(&conditions), Some(later));
    }

    #[test]
    fn test_expiry_boundary() {
        let ttl = Duration::from_secs(60);
        let at_boundary = t0() + chrono::TimeDelta::seconds(60);
        let past = at_boundary + chrono::TimeDelta::seconds(1);

        assert!(!is_expired(t0(), ttl, at_boundary));
        assert!(is_expired(t0(), ttl, past));
        assert_eq!(requeue_after(t0(), ttl, t0()), ttl);
        assert_eq!(requeue_after(t0(), ttl, past), Duration::ZERO);
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let ttl = Duration::from_secs(u64::MAX);
        assert!(!is_expired(t0(), ttl, t0()));
    }
}

//! CFSecurityGroup reconciler tests

use std::time::Duration;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use serde_json::json;

use cf_controllers::controller::conditions::condition_types;
use cf_controllers::controller::{Error, SECURITY_GROUP_FINALIZER, find_condition};
use cf_controllers::crd::{
    CFSecurityGroup, ConditionStatus, GlobalNetworkPolicy, NetworkPolicy, PortRange, Protocol,
};
use cf_controllers::resources::common::SECURITY_GROUP_LABEL;
use cf_controllers::store::Selector;
use cf_controllers::Store;

use crate::common::*;

const POLICY: &str = "default.sg";

async fn policy(h: &SecurityGroupHarness, namespace: &str) -> Option<NetworkPolicy> {
    h.store.get(Some(namespace), POLICY).await.unwrap()
}

async fn global_policy(h: &SecurityGroupHarness) -> Option<GlobalNetworkPolicy> {
    h.store.get(None, POLICY).await.unwrap()
}

async fn create(h: &SecurityGroupHarness, sg: CFSecurityGroup) {
    h.store.create(&sg).await.unwrap();
}

fn web_group() -> SecurityGroupBuilder {
    SecurityGroupBuilder::new("sg").with_rule("tcp", "80,443", "10.0.0.0/24")
}

mod apply_tests {
    use super::*;

    #[tokio::test]
    async fn test_policy_per_bound_space() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            web_group()
                .bound_to("space-a", true, false)
                .bound_to("space-b", true, true)
                .build(),
        )
        .await;

        let action = h.reconcile("sg").await.unwrap();
        assert_eq!(action, Action::await_change());

        let a = policy(&h, "space-a").await.unwrap();
        assert_eq!(
            a.spec.selector,
            "korifi.cloudfoundry.org/workload-type in { 'app' }"
        );
        assert_eq!(a.spec.types, vec!["Egress".to_string()]);
        assert_eq!(a.labels()[SECURITY_GROUP_LABEL], "sg");

        let rule = &a.spec.egress[0];
        assert_eq!(rule.protocol, Protocol::Tcp);
        assert_eq!(rule.destination.nets, vec!["10.0.0.0/24".to_string()]);
        assert_eq!(
            rule.destination.ports,
            vec![PortRange::single(80), PortRange::single(443)]
        );

        let b = policy(&h, "space-b").await.unwrap();
        assert_eq!(
            b.spec.selector,
            "korifi.cloudfoundry.org/workload-type in { 'app', 'build' }"
        );
        assert!(global_policy(&h).await.is_none());
    }

    #[tokio::test]
    async fn test_unbound_space_entry_gets_no_policy() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().bound_to("space-a", false, false).build()).await;

        h.reconcile("sg").await.unwrap();

        assert!(policy(&h, "space-a").await.is_none());
    }

    #[tokio::test]
    async fn test_global_policy() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().globally(false, true).build()).await;

        h.reconcile("sg").await.unwrap();

        let global = global_policy(&h).await.unwrap();
        assert_eq!(
            global.spec.selector,
            "korifi.cloudfoundry.org/workload-type in { 'build' }"
        );
        assert_eq!(
            global.spec.namespace_selector,
            "has(korifi.cloudfoundry.org/space-guid)"
        );
        assert_eq!(global.spec.egress.len(), 1);
    }

    #[tokio::test]
    async fn test_ranges_are_compiled() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            SecurityGroupBuilder::new("sg")
                .with_rule("udp", "8000-9000", "10.0.0.1-10.0.0.6")
                .bound_to("space-a", true, false)
                .build(),
        )
        .await;

        h.reconcile("sg").await.unwrap();

        let rule = policy(&h, "space-a").await.unwrap().spec.egress[0].clone();
        assert_eq!(rule.protocol, Protocol::Udp);
        assert_eq!(
            rule.destination.ports,
            vec![PortRange {
                min_port: 8000,
                max_port: 9000
            }]
        );
        assert_eq!(
            rule.destination.nets,
            vec!["10.0.0.1/32", "10.0.0.2/31", "10.0.0.4/31", "10.0.0.6/32"]
        );
    }

    #[tokio::test]
    async fn test_ready_and_finalizer() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().bound_to("space-a", true, false).build()).await;

        h.reconcile("sg").await.unwrap();

        let sg = h.security_group("sg").await.unwrap();
        assert!(sg.finalizers().contains(&SECURITY_GROUP_FINALIZER.to_string()));

        let status = sg.status.unwrap();
        assert_eq!(status.observed_generation, Some(1));
        let ready = find_condition(&status.conditions, condition_types::READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.reason, "Ready");
        assert_eq!(ready.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_second_reconcile_writes_nothing() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            web_group()
                .bound_to("space-a", true, false)
                .globally(true, false)
                .build(),
        )
        .await;
        h.reconcile("sg").await.unwrap();

        let writes = h.store.write_count();
        h.clock.advance(Duration::from_secs(30));
        h.reconcile("sg").await.unwrap();

        assert_eq!(h.store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_rule_change_updates_policies() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().bound_to("space-a", true, false).build()).await;
        h.reconcile("sg").await.unwrap();

        let _: CFSecurityGroup = h
            .store
            .patch(
                Some(ROOT_NAMESPACE),
                "sg",
                &json!({"spec": {"rules": [
                    {"protocol": "tcp", "ports": "5432", "destination": "192.168.1.10"}
                ]}}),
            )
            .await
            .unwrap();
        h.reconcile("sg").await.unwrap();

        let rule = policy(&h, "space-a").await.unwrap().spec.egress[0].clone();
        assert_eq!(rule.destination.nets, vec!["192.168.1.10/32".to_string()]);
        assert_eq!(rule.destination.ports, vec![PortRange::single(5432)]);

        let status = h.security_group("sg").await.unwrap().status.unwrap();
        assert_eq!(status.observed_generation, Some(2));
    }
}

mod orphan_tests {
    use super::*;

    #[tokio::test]
    async fn test_unbound_space_policy_is_removed() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            web_group()
                .bound_to("space-a", true, false)
                .bound_to("space-b", true, false)
                .build(),
        )
        .await;
        h.reconcile("sg").await.unwrap();
        assert!(policy(&h, "space-b").await.is_some());

        let _: CFSecurityGroup = h
            .store
            .patch(
                Some(ROOT_NAMESPACE),
                "sg",
                &json!({"spec": {"spaces": {"space-b": null}}}),
            )
            .await
            .unwrap();
        h.reconcile("sg").await.unwrap();

        assert!(policy(&h, "space-a").await.is_some());
        assert!(policy(&h, "space-b").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_workloads_remove_policy() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().bound_to("space-a", true, false).build()).await;
        h.reconcile("sg").await.unwrap();

        let _: CFSecurityGroup = h
            .store
            .patch(
                Some(ROOT_NAMESPACE),
                "sg",
                &json!({"spec": {"spaces": {"space-a": {"running": false, "staging": false}}}}),
            )
            .await
            .unwrap();
        h.reconcile("sg").await.unwrap();

        assert!(policy(&h, "space-a").await.is_none());
    }

    #[tokio::test]
    async fn test_global_policy_removed_when_disabled() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().globally(true, false).build()).await;
        h.reconcile("sg").await.unwrap();
        assert!(global_policy(&h).await.is_some());

        let _: CFSecurityGroup = h
            .store
            .patch(
                Some(ROOT_NAMESPACE),
                "sg",
                &json!({"spec": {"globallyEnabled": {"running": false, "staging": false}}}),
            )
            .await
            .unwrap();
        h.reconcile("sg").await.unwrap();

        assert!(global_policy(&h).await.is_none());
    }

    #[tokio::test]
    async fn test_other_groups_policies_are_untouched() {
        let h = SecurityGroupHarness::new();
        create(&h, web_group().bound_to("space-a", true, false).build()).await;
        create(
            &h,
            SecurityGroupBuilder::new("other")
                .with_rule("tcp", "22", "10.1.0.1")
                .bound_to("space-b", true, false)
                .build(),
        )
        .await;
        h.reconcile("sg").await.unwrap();
        h.reconcile("other").await.unwrap();

        let selector = Selector::default();
        let policies: Vec<NetworkPolicy> = h.store.list(None, &selector).await.unwrap();
        assert_eq!(policies.len(), 2);
        assert!(
            h.store
                .get::<NetworkPolicy>(Some("space-b"), "default.other")
                .await
                .unwrap()
                .is_some()
        );
    }
}

mod finalize_tests {
    use super::*;

    #[tokio::test]
    async fn test_deletion_removes_policies_then_group() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            web_group()
                .bound_to("space-a", true, false)
                .bound_to("space-b", false, true)
                .globally(true, true)
                .build(),
        )
        .await;
        h.reconcile("sg").await.unwrap();

        h.store
            .delete::<CFSecurityGroup>(Some(ROOT_NAMESPACE), "sg")
            .await
            .unwrap();
        // Held back by the deletion guard
        assert!(h.security_group("sg").await.is_some());

        h.reconcile("sg").await.unwrap();

        assert!(policy(&h, "space-a").await.is_none());
        assert!(policy(&h, "space-b").await.is_none());
        assert!(global_policy(&h).await.is_none());
        assert!(h.security_group("sg").await.is_none());
    }

    #[tokio::test]
    async fn test_deletion_without_policies() {
        let h = SecurityGroupHarness::new();
        let mut sg = web_group().build();
        sg.metadata.finalizers = Some(vec![SECURITY_GROUP_FINALIZER.to_string()]);
        create(&h, sg).await;
        h.store
            .delete::<CFSecurityGroup>(Some(ROOT_NAMESPACE), "sg")
            .await
            .unwrap();

        h.reconcile("sg").await.unwrap();

        assert!(h.security_group("sg").await.is_none());
    }

    #[tokio::test]
    async fn test_deleted_group_is_a_noop() {
        let h = SecurityGroupHarness::new();
        let action = h.reconcile("sg").await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(h.store.write_count(), 0);
    }
}

mod invalid_rule_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_destination_marks_not_ready() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            SecurityGroupBuilder::new("sg")
                .with_rule("tcp", "80", "not-an-address")
                .bound_to("space-a", true, false)
                .build(),
        )
        .await;

        let err = h.reconcile("sg").await.unwrap_err();

        assert!(matches!(err, Error::ValidationError(_)));
        assert!(!err.is_retryable());
        assert!(policy(&h, "space-a").await.is_none());

        let sg = h.security_group("sg").await.unwrap();
        assert!(sg.finalizers().contains(&SECURITY_GROUP_FINALIZER.to_string()));
        let status = sg.status.unwrap();
        let ready = find_condition(&status.conditions, condition_types::READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, "InvalidSpec");
        assert!(ready.message.contains("not-an-address"));
    }

    #[tokio::test]
    async fn test_one_bad_rule_blocks_all_rules() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            web_group()
                .with_rule("tcp", "9000-8000", "10.0.0.1")
                .bound_to("space-a", true, false)
                .build(),
        )
        .await;

        assert!(h.reconcile("sg").await.is_err());
        assert!(policy(&h, "space-a").await.is_none());
    }

    #[tokio::test]
    async fn test_fixing_the_rule_recovers() {
        let h = SecurityGroupHarness::new();
        create(
            &h,
            SecurityGroupBuilder::new("sg")
                .with_rule("tcp", "", "10.0.0.1")
                .bound_to("space-a", true, false)
                .build(),
        )
        .await;
        assert!(h.reconcile("sg").await.is_err());

        let _: CFSecurityGroup = h
            .store
            .patch(
                Some(ROOT_NAMESPACE),
                "sg",
                &json!({"spec": {"rules": [
                    {"protocol": "tcp", "ports": "443", "destination": "10.0.0.1"}
                ]}}),
            )
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(10));
        h.reconcile("sg").await.unwrap();

        assert!(policy(&h, "space-a").await.is_some());
        let status = h.security_group("sg").await.unwrap().status.unwrap();
        let ready = find_condition(&status.conditions, condition_types::READY).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.observed_generation, Some(2));
    }
}

//! CFSecurityGroup reconciliation
//!
//! Compiles a security group into one Calico NetworkPolicy per bound space and
//! an optional GlobalNetworkPolicy. The policies live outside the security
//! group's namespace (or are cluster-scoped), so they cannot be owned by it;
//! a deletion guard lets the controller remove them before the group goes away.

use async_trait::async_trait;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, info};

use crate::controller::conditions::{ReadyConditionBuilder, set_condition};
use crate::controller::context::Context;
use crate::controller::engine::{ObjectReconciler, StatusSubresource};
use crate::controller::error::Result;
use crate::controller::finalizer::{add_finalizer, is_terminating, remove_finalizer};
use crate::controller::patch::{UpsertOutcome, upsert};
use crate::crd::{CFSecurityGroup, ConditionStatus, GlobalNetworkPolicy, NetworkPolicy};
use crate::resources::common::SECURITY_GROUP_LABEL;
use crate::resources::network_policy::{
    build_egress_rules, generate_global_network_policy, generate_network_policy, policy_name,
};
use crate::store::{Selector, Store, ignore_not_found};

pub const SECURITY_GROUP_CONTROLLER: &str = "cfsecuritygroup";

/// Deletion guard held while generated policies may exist
pub const SECURITY_GROUP_FINALIZER: &str = "cfSecurityGroup.korifi.cloudfoundry.org";

pub struct SecurityGroupReconciler<S: Store> {
    ctx: Context<S>,
}

impl<S: Store> SecurityGroupReconciler<S> {
    pub fn new(ctx: Context<S>) -> Self {
        Self { ctx }
    }

    async fn apply_policies(&self, sg: &CFSecurityGroup) -> Result<()> {
        let store = self.ctx.store.as_ref();
        let egress = build_egress_rules(&sg.spec.rules)?;

        for (namespace, workloads) in &sg.spec.spaces {
            if !workloads.any() {
                continue;
            }
            let policy = generate_network_policy(sg, namespace, *workloads, egress.clone());
            let (_, outcome) = upsert(store, &policy).await?;
            if outcome != UpsertOutcome::Unchanged {
                debug!(namespace = %namespace, ?outcome, "Network policy applied");
            }
        }

        if sg.spec.globally_enabled.any() {
            let policy = generate_global_network_policy(sg, egress);
            let (_, outcome) = upsert(store, &policy).await?;
            if outcome != UpsertOutcome::Unchanged {
                debug!(?outcome, "Global network policy applied");
            }
        }

        self.delete_orphans(sg).await
    }

    /// Remove policies for spaces (or global scope) no longer bound
    async fn delete_orphans(&self, sg: &CFSecurityGroup) -> Result<()> {
        let store = self.ctx.store.as_ref();
        let name = sg.name_any();
        let selector = Selector::default().label(SECURITY_GROUP_LABEL, &name);

        let policies: Vec<NetworkPolicy> = store.list(None, &selector).await?;
        for policy in policies {
            let namespace = policy.namespace().unwrap_or_default();
            let in_scope = sg
                .spec
                .spaces
                .get(&namespace)
                .is_some_and(|workloads| workloads.any());
            if !in_scope {
                info!(namespace = %namespace, "Deleting orphaned network policy");
                ignore_not_found(
                    store
                        .delete::<NetworkPolicy>(Some(&namespace), &policy.name_any())
                        .await,
                )?;
            }
        }

        if !sg.spec.globally_enabled.any() {
            ignore_not_found(
                store
                    .delete::<GlobalNetworkPolicy>(None, &policy_name(&name))
                    .await,
            )?;
        }

        Ok(())
    }

    async fn finalize(&self, sg: &mut CFSecurityGroup) -> Result<()> {
        let store = self.ctx.store.as_ref();
        let name = policy_name(&sg.name_any());
        let selector = Selector::default().field("metadata.name", &name);

        let policies: Vec<NetworkPolicy> = store.list(None, &selector).await?;
        for policy in policies {
            ignore_not_found(
                store
                    .delete::<NetworkPolicy>(policy.namespace().as_deref(), &name)
                    .await,
            )?;
        }
        ignore_not_found(store.delete::<GlobalNetworkPolicy>(None, &name).await)?;

        remove_finalizer(sg, SECURITY_GROUP_FINALIZER);
        info!(security_group = %sg.name_any(), "Security group policies removed");
        Ok(())
    }
}

#[async_trait]
impl<S: Store> ObjectReconciler<CFSecurityGroup> for SecurityGroupReconciler<S> {
    fn name(&self) -> &'static str {
        SECURITY_GROUP_CONTROLLER
    }

    async fn reconcile_resource(&self, sg: &mut CFSecurityGroup) -> Result<Action> {
        if is_terminating(sg) {
            self.finalize(sg).await?;
            return Ok(Action::await_change());
        }

        add_finalizer(sg, SECURITY_GROUP_FINALIZER);
        let generation = sg.metadata.generation;
        sg.status_mut().observed_generation = generation;

        let result = self.apply_policies(sg).await;

        let ready = match &result {
            Ok(()) => ReadyConditionBuilder::new(generation).with_status(ConditionStatus::True),
            Err(e) => ReadyConditionBuilder::new(generation).with_error(e),
        };
        set_condition(&mut sg.status_mut().conditions, ready.build(self.ctx.now()));

        result.map(|()| Action::await_change())
    }
}

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;
pub mod store;

pub use config::ControllerConfig;
pub use controller::{
    Context, Error, PatchingReconciler, Result, SecurityGroupReconciler, TaskReconciler,
};
pub use crd::{CFSecurityGroup, CFTask, TaskWorkload};
pub use health::{HealthState, Metrics};
pub use store::{KubeStore, MemoryStore, ObjectKey, Store};

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use crate::controller::{KubeEventRecorder, object_error_policy, reconcile_object};
use crate::resources::AppEnvBuilder;

/// Reporter name on published events
pub const EVENT_REPORTER: &str = "cf-controllers";

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn context(client: &Client, config: Arc<ControllerConfig>) -> Context<KubeStore> {
    Context::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(KubeEventRecorder::new(client.clone(), EVENT_REPORTER)),
        config,
    )
}

/// Run the CFTask controller with optional namespace scoping.
///
/// Watches CFTasks and the TaskWorkloads they own, so workload progress
/// triggers a task reconcile.
pub async fn run_task_controller(
    client: Client,
    config: Arc<ControllerConfig>,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    tracing::info!(
        "Starting controller for CFTask resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let ctx = context(&client, config);
    let env = Arc::new(AppEnvBuilder::new(ctx.store.clone()));
    let engine: Arc<PatchingReconciler<CFTask, _, _>> = Arc::new(
        PatchingReconciler::new(ctx.store.clone(), TaskReconciler::new(ctx, env))
            .with_health(health_state),
    );

    let tasks: Api<CFTask> = scoped_api(client.clone(), namespace);
    let workloads: Api<TaskWorkload> = scoped_api(client.clone(), namespace);
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(tasks, watcher_config.clone())
        .owns(workloads, watcher_config)
        .shutdown_on_signal()
        .run(reconcile_object, object_error_policy, engine)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled task: {}", obj.name);
                }
                Err(e) => log_controller_error("CFTask", &e),
            }
        })
        .await;

    tracing::info!("Task controller stopped");
}

/// Run the CFSecurityGroup controller with optional namespace scoping.
pub async fn run_security_group_controller(
    client: Client,
    config: Arc<ControllerConfig>,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    tracing::info!(
        "Starting controller for CFSecurityGroup resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let ctx = context(&client, config);
    let engine: Arc<PatchingReconciler<CFSecurityGroup, _, _>> = Arc::new(
        PatchingReconciler::new(ctx.store.clone(), SecurityGroupReconciler::new(ctx))
            .with_health(health_state),
    );

    let groups: Api<CFSecurityGroup> = scoped_api(client.clone(), namespace);

    Controller::new(groups, WatcherConfig::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile_object, object_error_policy, engine)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled security group: {}", obj.name);
                }
                Err(e) => log_controller_error("CFSecurityGroup", &e),
            }
        })
        .await;

    tracing::info!("Security group controller stopped");
}

fn log_controller_error(
    kind: &str,
    error: &kube::runtime::controller::Error<Error, kube::runtime::watcher::Error>,
) {
    // Dependency lookups failing is routine while an app is still staging
    let routine = matches!(
        error,
        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_retryable()
    );
    if routine {
        tracing::debug!("{} reconciliation error: {:?}", kind, error);
    } else {
        tracing::error!("{} reconciliation error: {:?}", kind, error);
    }
}

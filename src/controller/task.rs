//! CFTask reconciliation
//!
//! Resolves the task's app, droplet and web process, derives a TaskWorkload
//! from them and mirrors the workload's progress back onto the task. Completed
//! tasks delete themselves once the configured TTL has elapsed; a requeue is
//! scheduled for exactly that moment.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::controller::conditions::{ConditionBuilder, condition_types, find_condition, is_true};
use crate::controller::context::Context;
use crate::controller::engine::{ObjectReconciler, StatusSubresource};
use crate::controller::error::{Error, Result};
use crate::controller::events::ObjectEvent;
use crate::controller::finalizer::is_terminating;
use crate::controller::patch::{UpsertOutcome, upsert};
use crate::controller::task_phase::{TaskPhase, completion_time, is_expired, requeue_after};
use crate::crd::{
    BuildDropletStatus, CFApp, CFBuild, CFProcess, CFTask, ConditionStatus, TaskWorkload,
    WEB_PROCESS_TYPE, task_conditions,
};
use crate::resources::common::{APP_GUID_LABEL, PROCESS_TYPE_LABEL};
use crate::resources::env::EnvBuilder;
use crate::resources::task_workload::{TaskWorkloadParams, cpu_millicores, generate_task_workload};
use crate::resources::{owner_reference, set_owner_reference};
use crate::store::{Selector, Store, ignore_not_found};

/// Controller name for logs and metrics
pub const TASK_CONTROLLER: &str = "cftask";

pub const TASK_CANCELED_REASON: &str = "TaskCanceled";
pub const TASK_INITIALIZED_REASON: &str = "TaskInitialized";

/// Event reasons
pub mod task_events {
    pub const APP_NOT_FOUND: &str = "AppNotFound";
    pub const APP_NOT_READY: &str = "AppNotReady";
    pub const APP_DROPLET_NOT_SET: &str = "AppCurrentDropletRefNotSet";
    pub const DROPLET_NOT_FOUND: &str = "CFDropletNotFound";
    pub const DROPLET_NOT_STAGED: &str = "CFDropletNotStaged";
    pub const WORKLOAD_CREATED: &str = "TaskWorkloadCreated";
}

/// Workload conditions copied onto the task
const MIRRORED_CONDITIONS: [&str; 3] = [
    task_conditions::STARTED,
    task_conditions::SUCCEEDED,
    task_conditions::FAILED,
];

pub struct TaskReconciler<S: Store> {
    ctx: Context<S>,
    env: Arc<dyn EnvBuilder>,
}

impl<S: Store> TaskReconciler<S> {
    pub fn new(ctx: Context<S>, env: Arc<dyn EnvBuilder>) -> Self {
        Self { ctx, env }
    }

    async fn warn(&self, task: &CFTask, reason: &str, note: String) {
        self.ctx
            .recorder
            .publish(task.object_ref(&()), ObjectEvent::warning(reason, note))
            .await;
    }

    fn set_conditions(
        task: &mut CFTask,
        now: DateTime<Utc>,
        update: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) {
        let generation = task.metadata.generation;
        let status = task.status_mut();
        let existing = std::mem::take(&mut status.conditions);
        status.conditions = update(ConditionBuilder::from_existing(existing, generation).at(now)).build();
    }

    fn ttl_action(&self, task: &CFTask, now: DateTime<Utc>) -> Action {
        let conditions = task.status().map(|s| s.conditions.as_slice()).unwrap_or_default();
        match completion_time(conditions) {
            Some(completed) => {
                Action::requeue(requeue_after(completed, self.ctx.config.task_ttl, now))
            }
            None => Action::await_change(),
        }
    }

    async fn cancel(&self, task: &mut CFTask, now: DateTime<Utc>) -> Result<Action> {
        let namespace = task.namespace();
        ignore_not_found(
            self.ctx
                .store
                .delete::<TaskWorkload>(namespace.as_deref(), &task.name_any())
                .await,
        )?;

        let succeeded = task
            .status()
            .is_some_and(|s| is_true(&s.conditions, task_conditions::SUCCEEDED));

        Self::set_conditions(task, now, |builder| {
            let builder = builder.set_condition(
                task_conditions::CANCELED,
                ConditionStatus::True,
                TASK_CANCELED_REASON,
                "",
            );
            if succeeded {
                builder
            } else {
                builder.set_condition(
                    task_conditions::FAILED,
                    ConditionStatus::True,
                    TASK_CANCELED_REASON,
                    "",
                )
            }
        });

        info!(task = %task.name_any(), "Task canceled");
        Ok(self.ttl_action(task, now))
    }

    async fn resolve_app(&self, task: &CFTask) -> Result<CFApp> {
        let namespace = task.namespace();
        let app_name = &task.spec.app_ref.name;

        let Some(app) = self
            .ctx
            .store
            .get::<CFApp>(namespace.as_deref(), app_name)
            .await?
        else {
            let note = format!(
                "Did not find app with name {} in namespace {}",
                app_name,
                namespace.as_deref().unwrap_or_default()
            );
            self.warn(task, task_events::APP_NOT_FOUND, note.clone()).await;
            return Err(Error::NotFound(note));
        };

        let ready = app
            .status
            .as_ref()
            .is_some_and(|s| is_true(&s.conditions, condition_types::READY));
        if !ready {
            let note = format!("App {} is not ready", app_name);
            self.warn(task, task_events::APP_NOT_READY, note.clone()).await;
            return Err(Error::NotReady(note));
        }

        if !app.spec.current_droplet_ref.is_set() {
            let note = format!("App {} does not have a current droplet", app_name);
            self.warn(task, task_events::APP_DROPLET_NOT_SET, note.clone())
                .await;
            return Err(Error::NotReady(note));
        }

        Ok(app)
    }

    async fn resolve_droplet(&self, task: &CFTask, app: &CFApp) -> Result<BuildDropletStatus> {
        let namespace = task.namespace();
        let build_name = &app.spec.current_droplet_ref.name;

        let Some(build) = self
            .ctx
            .store
            .get::<CFBuild>(namespace.as_deref(), build_name)
            .await?
        else {
            let note = format!("Did not find droplet with name {}", build_name);
            self.warn(task, task_events::DROPLET_NOT_FOUND, note.clone())
                .await;
            return Err(Error::NotFound(note));
        };

        match build.status.and_then(|s| s.droplet) {
            Some(droplet) => Ok(droplet),
            None => {
                let note = format!("Build {} does not have a droplet", build_name);
                self.warn(task, task_events::DROPLET_NOT_STAGED, note.clone())
                    .await;
                Err(Error::NotReady(note))
            }
        }
    }

    /// Stamp sequence id, quota and droplet on the first pass
    fn initialize(&self, task: &mut CFTask, app: &CFApp, now: DateTime<Utc>) {
        let initialized = task
            .status()
            .is_some_and(|s| is_true(&s.conditions, task_conditions::INITIALIZED));
        if initialized {
            return;
        }

        let defaults = self.ctx.config.cf_process_defaults;
        let status = task.status_mut();
        status.sequence_id = now.timestamp_micros();
        status.memory_mb = defaults.memory_mb;
        status.disk_quota_mb = defaults.disk_quota_mb;
        status.droplet_ref = app.spec.current_droplet_ref.clone();

        Self::set_conditions(task, now, |builder| {
            builder.set_condition(
                task_conditions::INITIALIZED,
                ConditionStatus::True,
                TASK_INITIALIZED_REASON,
                "",
            )
        });
        info!(task = %task.name_any(), "Task initialized");
    }

    async fn web_process(&self, task: &CFTask, app: &CFApp) -> Result<CFProcess> {
        let app_name = app.name_any();
        let selector = Selector::default()
            .label(APP_GUID_LABEL, &app_name)
            .label(PROCESS_TYPE_LABEL, WEB_PROCESS_TYPE);

        let mut processes = self
            .ctx
            .store
            .list::<CFProcess>(task.namespace().as_deref(), &selector)
            .await?;

        if processes.len() != 1 {
            return Err(Error::AmbiguousProcess {
                app: app_name,
                count: processes.len(),
            });
        }
        processes.pop().ok_or(Error::AmbiguousProcess {
            app: app_name,
            count: 0,
        })
    }
}

#[async_trait]
impl<S: Store> ObjectReconciler<CFTask> for TaskReconciler<S> {
    fn name(&self) -> &'static str {
        TASK_CONTROLLER
    }

    async fn reconcile_resource(&self, task: &mut CFTask) -> Result<Action> {
        // Tasks carry no deletion guard; nothing to tear down
        if is_terminating(task) {
            return Ok(Action::await_change());
        }

        let now = self.ctx.now();
        let ttl = self.ctx.config.task_ttl;
        task.status_mut().observed_generation = task.metadata.generation;

        let completed = completion_time(&task.status_mut().conditions);
        if let Some(completed) = completed {
            if is_expired(completed, ttl, now) {
                info!(task = %task.name_any(), "Task TTL expired, deleting");
                ignore_not_found(
                    self.ctx
                        .store
                        .delete::<CFTask>(task.namespace().as_deref(), &task.name_any())
                        .await,
                )?;
                return Ok(Action::await_change());
            }
        }

        if task.spec.canceled {
            return self.cancel(task, now).await;
        }

        let app = self.resolve_app(task).await?;
        set_owner_reference(task, owner_reference(&app, false));

        let droplet = self.resolve_droplet(task, &app).await?;
        self.initialize(task, &app, now);

        let web = self.web_process(task, &app).await?;
        let env = self.env.build_env(&app).await?;

        let workload = generate_task_workload(
            task,
            TaskWorkloadParams {
                app_name: &app.name_any(),
                droplet: &droplet,
                launcher_path: &self.ctx.config.launcher_path,
                env,
                cpu_millicores: cpu_millicores(web.spec.memory_mb),
            },
        );
        let (workload, outcome) = upsert(self.ctx.store.as_ref(), &workload).await?;
        if outcome == UpsertOutcome::Created {
            self.ctx
                .recorder
                .publish(
                    task.object_ref(&()),
                    ObjectEvent::normal(
                        task_events::WORKLOAD_CREATED,
                        format!("Created task workload {}", workload.name_any()),
                    ),
                )
                .await;
        }

        let workload_conditions = workload
            .status
            .map(|s| s.conditions)
            .unwrap_or_default();
        Self::set_conditions(task, now, |builder| {
            MIRRORED_CONDITIONS
                .iter()
                .filter_map(|type_| find_condition(&workload_conditions, type_))
                .fold(builder, |builder, condition| builder.mirror(condition))
        });

        let phase = TaskPhase::from_conditions(&task.status_mut().conditions);
        if phase.is_terminal() {
            debug!(task = %task.name_any(), %phase, "Task finished, waiting for TTL");
        } else {
            debug!(task = %task.name_any(), %phase, "Task reconciled");
        }

        Ok(self.ttl_action(task, now))
    }
}

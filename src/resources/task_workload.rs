//! TaskWorkload generation for CFTasks

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, LocalObjectReference, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{BuildDropletStatus, CFTask, TaskWorkload, TaskWorkloadSpec};
use crate::resources::common::{owner_reference, task_workload_labels};

/// Smallest CPU request handed to any task, in millicores
pub const MIN_CPU_MILLICORES: i64 = 5;

/// CPU request in millicores for a process with `memory_mb` of memory
///
/// 100 millicores per GiB, floored at [`MIN_CPU_MILLICORES`].
pub fn cpu_millicores(memory_mb: i64) -> i64 {
    (100 * memory_mb / 1024).max(MIN_CPU_MILLICORES)
}

/// Requests for memory, disk and CPU; limits for memory and disk only
pub fn task_resources(memory_mb: i64, disk_mb: i64, cpu_millicores: i64) -> ResourceRequirements {
    let memory = Quantity(format!("{}Mi", memory_mb));
    let disk = Quantity(format!("{}Mi", disk_mb));

    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity(format!("{}m", cpu_millicores))),
            ("ephemeral-storage".to_string(), disk.clone()),
            ("memory".to_string(), memory.clone()),
        ])),
        limits: Some(BTreeMap::from([
            ("ephemeral-storage".to_string(), disk),
            ("memory".to_string(), memory),
        ])),
        ..Default::default()
    }
}

/// Everything the workload is derived from besides the task itself
pub struct TaskWorkloadParams<'a> {
    pub app_name: &'a str,
    pub droplet: &'a BuildDropletStatus,
    pub launcher_path: &'a str,
    pub env: Vec<EnvVar>,
    pub cpu_millicores: i64,
}

/// Generate the workload for a task
///
/// Named after the task and controlled by it, so deleting the task removes
/// the workload.
pub fn generate_task_workload(task: &CFTask, params: TaskWorkloadParams<'_>) -> TaskWorkload {
    let status = task.status.clone().unwrap_or_default();

    let mut env = params.env;
    env.sort_by(|a, b| a.name.cmp(&b.name));

    let image_pull_secrets = params
        .droplet
        .registry
        .image_pull_secrets
        .iter()
        .map(|secret| LocalObjectReference {
            name: secret.name.clone(),
        })
        .collect();

    TaskWorkload {
        metadata: ObjectMeta {
            name: Some(task.name_any()),
            namespace: task.namespace(),
            labels: Some(task_workload_labels(&task.name_any(), params.app_name)),
            owner_references: Some(vec![owner_reference(task, true)]),
            ..Default::default()
        },
        spec: TaskWorkloadSpec {
            image: params.droplet.registry.image.clone(),
            image_pull_secrets,
            command: vec![params.launcher_path.to_string(), task.spec.command.clone()],
            resources: task_resources(status.memory_mb, status.disk_quota_mb, params.cpu_millicores),
            env,
        },
        status: None,
    }
}

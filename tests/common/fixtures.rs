//! Test fixtures and builders for Cloud Foundry resources
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let app = AppBuilder::new("my-app").ready().with_droplet("my-build").build();
//! let build = staged_build("my-build", "registry.example/droplet:1");
//! let process = web_process("my-app-web", "my-app", 1024);
//! let task = task("my-task", "my-app", "bin/migrate");
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::core::ObjectMeta;

use cf_controllers::controller::conditions::{condition_types, format_time};
use cf_controllers::crd::{
    BuildDropletStatus, CFApp, CFAppSpec, CFAppStatus, CFBuild, CFBuildSpec, CFBuildStatus,
    CFProcess, CFProcessSpec, CFSecurityGroup, CFSecurityGroupSpec, CFTask, CFTaskSpec,
    Condition, ConditionStatus, DesiredState, LocalObjectRef, Registry, SecurityGroupRule,
    SecurityGroupWorkloads, WEB_PROCESS_TYPE,
};
use cf_controllers::resources::common::{APP_GUID_LABEL, PROCESS_TYPE_LABEL};

/// Namespace backing the space every fixture lives in
pub const SPACE: &str = "cf-space-1";

/// Namespace security groups are created in
pub const ROOT_NAMESPACE: &str = "cf";

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// A condition stamped at `time`
pub fn condition(type_: &str, status: ConditionStatus, time: DateTime<Utc>) -> Condition {
    Condition {
        type_: type_.to_string(),
        status,
        reason: type_.to_string(),
        message: String::new(),
        last_transition_time: format_time(time),
        observed_generation: Some(1),
    }
}

// =============================================================================
// Apps
// =============================================================================

/// Builder for CFApp resources
pub struct AppBuilder {
    name: String,
    namespace: String,
    ready: bool,
    droplet: String,
    env_secret: String,
    vcap_application: String,
    vcap_services: String,
}

impl AppBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: SPACE.to_string(),
            ready: false,
            droplet: String::new(),
            env_secret: String::new(),
            vcap_application: String::new(),
            vcap_services: String::new(),
        }
    }

    pub fn ready(mut self) -> Self {
        self.ready = true;
        self
    }

    pub fn with_droplet(mut self, build: &str) -> Self {
        self.droplet = build.to_string();
        self
    }

    pub fn with_env_secret(mut self, secret: &str) -> Self {
        self.env_secret = secret.to_string();
        self
    }

    pub fn with_vcap_secrets(mut self, application: &str, services: &str) -> Self {
        self.vcap_application = application.to_string();
        self.vcap_services = services.to_string();
        self
    }

    pub fn build(self) -> CFApp {
        let conditions = if self.ready {
            vec![Condition {
                type_: condition_types::READY.to_string(),
                status: ConditionStatus::True,
                reason: "Ready".to_string(),
                message: String::new(),
                last_transition_time: "2024-01-01T00:00:00Z".to_string(),
                observed_generation: Some(1),
            }]
        } else {
            Vec::new()
        };

        CFApp {
            metadata: meta(&self.name, &self.namespace),
            spec: CFAppSpec {
                display_name: self.name.clone(),
                desired_state: DesiredState::Started,
                current_droplet_ref: LocalObjectRef::new(self.droplet),
                env_secret_name: self.env_secret,
            },
            status: Some(CFAppStatus {
                conditions,
                vcap_services_secret_name: self.vcap_services,
                vcap_application_secret_name: self.vcap_application,
                observed_generation: Some(1),
            }),
        }
    }
}

/// A ready app running the droplet of `build`
pub fn ready_app(name: &str, build: &str) -> CFApp {
    AppBuilder::new(name).ready().with_droplet(build).build()
}

// =============================================================================
// Builds and processes
// =============================================================================

/// A build whose staging produced a droplet with `image`
pub fn staged_build(name: &str, image: &str) -> CFBuild {
    CFBuild {
        status: Some(CFBuildStatus {
            droplet: Some(BuildDropletStatus {
                registry: Registry {
                    image: image.to_string(),
                    image_pull_secrets: vec![LocalObjectRef::new("registry-creds")],
                },
                stack: "cflinuxfs4".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..unstaged_build(name)
    }
}

/// A build that has not produced a droplet yet
pub fn unstaged_build(name: &str) -> CFBuild {
    CFBuild {
        metadata: meta(name, SPACE),
        spec: CFBuildSpec {
            package_ref: LocalObjectRef::new(format!("{}-package", name)),
            app_ref: LocalObjectRef::default(),
            ..Default::default()
        },
        status: None,
    }
}

/// A process of `app` labelled the way the task controller looks it up
pub fn process(name: &str, app: &str, process_type: &str, memory_mb: i64) -> CFProcess {
    CFProcess {
        metadata: ObjectMeta {
            labels: Some(BTreeMap::from([
                (APP_GUID_LABEL.to_string(), app.to_string()),
                (PROCESS_TYPE_LABEL.to_string(), process_type.to_string()),
            ])),
            ..meta(name, SPACE)
        },
        spec: CFProcessSpec {
            app_ref: LocalObjectRef::new(app),
            process_type: process_type.to_string(),
            memory_mb,
            disk_quota_mb: 1024,
            ..Default::default()
        },
        status: None,
    }
}

pub fn web_process(name: &str, app: &str, memory_mb: i64) -> CFProcess {
    process(name, app, WEB_PROCESS_TYPE, memory_mb)
}

/// An Opaque secret with the given keys
pub fn secret(name: &str, keys: &[&str]) -> Secret {
    Secret {
        metadata: meta(name, SPACE),
        data: Some(
            keys.iter()
                .map(|key| (key.to_string(), ByteString(b"value".to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

// =============================================================================
// Tasks
// =============================================================================

pub fn task(name: &str, app: &str, command: &str) -> CFTask {
    CFTask {
        metadata: meta(name, SPACE),
        spec: CFTaskSpec {
            command: command.to_string(),
            app_ref: LocalObjectRef::new(app),
            canceled: false,
        },
        status: None,
    }
}

// =============================================================================
// Security groups
// =============================================================================

/// Builder for CFSecurityGroup resources
pub struct SecurityGroupBuilder {
    name: String,
    spec: CFSecurityGroupSpec,
}

impl SecurityGroupBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spec: CFSecurityGroupSpec {
                display_name: name.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_rule(mut self, protocol: &str, ports: &str, destination: &str) -> Self {
        self.spec.rules.push(SecurityGroupRule {
            protocol: protocol.to_string(),
            ports: ports.to_string(),
            destination: destination.to_string(),
        });
        self
    }

    pub fn bound_to(mut self, space: &str, running: bool, staging: bool) -> Self {
        self.spec
            .spaces
            .insert(space.to_string(), SecurityGroupWorkloads { running, staging });
        self
    }

    pub fn globally(mut self, running: bool, staging: bool) -> Self {
        self.spec.globally_enabled = SecurityGroupWorkloads { running, staging };
        self
    }

    pub fn build(self) -> CFSecurityGroup {
        CFSecurityGroup {
            metadata: meta(&self.name, ROOT_NAMESPACE),
            spec: self.spec,
            status: None,
        }
    }
}

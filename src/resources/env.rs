//! Environment variables for app-derived workloads
//!
//! Values are never copied out of secrets; each variable references its secret
//! key so credentials stay in the secret.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, Secret, SecretKeySelector};
use kube::ResourceExt;

use crate::controller::{Error, Result};
use crate::crd::CFApp;
use crate::store::Store;

pub const VCAP_APPLICATION: &str = "VCAP_APPLICATION";
pub const VCAP_SERVICES: &str = "VCAP_SERVICES";

/// Builds the environment an app's workloads run with
#[async_trait]
pub trait EnvBuilder: Send + Sync {
    /// Variables sorted by name
    async fn build_env(&self, app: &CFApp) -> Result<Vec<EnvVar>>;
}

fn secret_ref(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Reads the app's environment secret and its VCAP secrets from the store
pub struct AppEnvBuilder<S> {
    store: Arc<S>,
}

impl<S: Store> AppEnvBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store> EnvBuilder for AppEnvBuilder<S> {
    async fn build_env(&self, app: &CFApp) -> Result<Vec<EnvVar>> {
        let namespace = app.namespace();
        let mut env = Vec::new();

        let secret_name = &app.spec.env_secret_name;
        if !secret_name.is_empty() {
            let secret: Secret = self
                .store
                .get(namespace.as_deref(), secret_name)
                .await?
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "env secret {} of app {}",
                        secret_name,
                        app.name_any()
                    ))
                })?;

            let keys: BTreeSet<&String> = secret
                .data
                .iter()
                .flat_map(|data| data.keys())
                .chain(secret.string_data.iter().flat_map(|data| data.keys()))
                .collect();
            env.extend(keys.into_iter().map(|key| secret_ref(key, secret_name, key)));
        }

        if let Some(status) = &app.status {
            if !status.vcap_application_secret_name.is_empty() {
                env.push(secret_ref(
                    VCAP_APPLICATION,
                    &status.vcap_application_secret_name,
                    VCAP_APPLICATION,
                ));
            }
            if !status.vcap_services_secret_name.is_empty() {
                env.push(secret_ref(
                    VCAP_SERVICES,
                    &status.vcap_services_secret_name,
                    VCAP_SERVICES,
                ));
            }
        }

        // User keys may shadow the VCAP variables; the VCAP reference wins
        env.reverse();
        let mut seen = BTreeSet::new();
        env.retain(|var| seen.insert(var.name.clone()));
        env.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(env)
    }
}

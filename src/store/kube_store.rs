//! Cluster-backed store
//!
//! Every kind goes through `Api<DynamicObject>` built from the type's
//! `ApiResource`, so one implementation serves both namespaced and
//! cluster-scoped kinds. Typed objects are converted through JSON.

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::core::TypeMeta;
use kube::Client;
use serde_json::Value;
use tracing::debug;

use super::{Object, ObjectKey, Selector, Store, StoreError};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "cf-controllers";

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Object>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::erase::<K>(&());
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

/// Convert an API response into the typed object
///
/// List items come back without `apiVersion`/`kind`, which typed core
/// resources require, so the type meta is filled in from `K`.
fn from_dynamic<K: Object>(mut obj: DynamicObject) -> Result<K, StoreError> {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
        });
    }
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn to_dynamic<K: Object>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn map_error<K: Object>(err: kube::Error, namespace: Option<&str>, name: &str) -> StoreError {
    let kind = K::kind(&()).to_string();
    let key = ObjectKey::new(namespace, name).to_string();
    match err {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound { kind, key },
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists { kind, key }
        }
        kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict {
            kind,
            key,
            message: resp.message,
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let found = self
            .api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_error::<K>(e, namespace, name))?;
        found.map(from_dynamic::<K>).transpose()
    }

    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if !selector.labels.is_empty() {
            params = params.labels(&selector.label_selector());
        }
        if !selector.fields.is_empty() {
            params = params.fields(&selector.field_selector());
        }

        let list = self
            .api::<K>(namespace)
            .list(&params)
            .await
            .map_err(StoreError::Api)?;
        list.items.into_iter().map(from_dynamic::<K>).collect()
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = obj.meta().namespace.clone();
        let name = obj.meta().name.clone().unwrap_or_default();
        let created = self
            .api::<K>(namespace.as_deref())
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| map_error::<K>(e, namespace.as_deref(), &name))?;
        debug!(kind = %K::kind(&()), name = %name, "Created object");
        from_dynamic(created)
    }

    async fn patch<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let patched = self
            .api::<K>(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| map_error::<K>(e, namespace, name))?;
        from_dynamic(patched)
    }

    async fn patch_status<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let patched = self
            .api::<K>(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| map_error::<K>(e, namespace, name))?;
        from_dynamic(patched)
    }

    async fn delete<K: Object>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_error::<K>(e, namespace, name))?;
        debug!(kind = %K::kind(&()), name = %name, "Deleted object");
        Ok(())
    }
}

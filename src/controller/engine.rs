//! Generic patch-based reconciliation engine
//!
//! [`PatchingReconciler`] fetches the object for a key, hands a mutable copy to
//! the domain [`ObjectReconciler`], then persists whatever the domain function
//! changed as two merge patches: one for everything but status (locked to the
//! fetched resource version) and one for the status subresource. Patches are
//! applied even when the domain function fails, so partial progress such as an
//! added deletion guard or a failure condition is never lost.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use serde::Serialize;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::controller::error::{BackoffConfig, Error, ErrorContext, Result};
use crate::controller::patch::{spec_patch, status_patch};
use crate::crd::{CFSecurityGroup, CFSecurityGroupStatus, CFTask, CFTaskStatus};
use crate::health::HealthState;
use crate::store::{Object, ObjectKey, Store, ignore_not_found};

/// Compile-time link between a kind and its status sub-struct
pub trait StatusSubresource {
    type Status: Serialize + Default + Send + Sync;

    fn status(&self) -> Option<&Self::Status>;

    /// The status, created empty if absent
    fn status_mut(&mut self) -> &mut Self::Status;
}

impl StatusSubresource for CFTask {
    type Status = CFTaskStatus;

    fn status(&self) -> Option<&CFTaskStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut CFTaskStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl StatusSubresource for CFSecurityGroup {
    type Status = CFSecurityGroupStatus;

    fn status(&self) -> Option<&CFSecurityGroupStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut CFSecurityGroupStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

/// Domain logic for one kind
///
/// Implementations mutate `obj` in place and may read or write other objects
/// through the store. They must be idempotent: a reconcile can be interrupted
/// at any point and rerun from scratch.
#[async_trait]
pub trait ObjectReconciler<K: Object>: Send + Sync + 'static {
    /// Controller name used in logs and metrics
    fn name(&self) -> &'static str;

    async fn reconcile_resource(&self, obj: &mut K) -> Result<Action>;
}

pub struct PatchingReconciler<K, R, S> {
    store: Arc<S>,
    reconciler: R,
    backoff: BackoffConfig,
    errors: Mutex<HashMap<ObjectKey, ErrorContext>>,
    health: Option<Arc<HealthState>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K, R, S> PatchingReconciler<K, R, S>
where
    K: Object + StatusSubresource,
    R: ObjectReconciler<K>,
    S: Store,
{
    pub fn new(store: Arc<S>, reconciler: R) -> Self {
        Self {
            store,
            reconciler,
            backoff: BackoffConfig::default(),
            errors: Mutex::new(HashMap::new()),
            health: None,
            _kind: PhantomData,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_health(mut self, health: Option<Arc<HealthState>>) -> Self {
        self.health = health;
        self
    }

    /// Consecutive failures recorded for `key`
    pub fn consecutive_errors(&self, key: &ObjectKey) -> u32 {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |ctx| ctx.consecutive_errors)
    }

    /// Reconcile the object stored under `key`
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let controller = self.reconciler.name();
        let span = info_span!("reconcile", controller, object = %key);
        let start = Instant::now();

        let result = self.reconcile_key(key).instrument(span).await;

        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(_) => {
                errors.remove(key);
            }
            Err(_) => errors.entry(key.clone()).or_default().record_error(),
        }
        drop(errors);

        if let Some(health) = &self.health {
            health
                .metrics
                .record_reconcile(controller, start.elapsed().as_secs_f64());
            match &result {
                Ok(_) => health.touch(),
                Err(_) => health.metrics.record_error(controller),
            }
        }

        result
    }

    async fn reconcile_key(&self, key: &ObjectKey) -> Result<Action> {
        let namespace = key.namespace.as_deref();
        debug!("Reconciling");

        let Some(mut obj) = self.store.get::<K>(namespace, &key.name).await? else {
            debug!("Object no longer exists");
            return Ok(Action::await_change());
        };
        let original = obj.clone();

        let result = self.reconciler.reconcile_resource(&mut obj).await;
        if let Err(e) = &result {
            debug!("Domain reconcile failed: {}", e);
        }

        self.apply_patches(key, &original, &obj).await?;
        result
    }

    async fn apply_patches(&self, key: &ObjectKey, original: &K, modified: &K) -> Result<()> {
        let namespace = key.namespace.as_deref();

        if let Some(patch) = spec_patch(original, modified)? {
            debug!(%patch, "Applying patch");
            // Not found: the domain function deleted the object
            if ignore_not_found(self.store.patch::<K>(namespace, &key.name, &patch).await)?
                .is_some()
            {
                self.record_patch("spec");
            }
        }

        if let Some(patch) = status_patch(original.status(), modified.status())? {
            debug!(%patch, "Applying status patch");
            if ignore_not_found(
                self.store
                    .patch_status::<K>(namespace, &key.name, &patch)
                    .await,
            )?
            .is_some()
            {
                self.record_patch("status");
            }
        }

        Ok(())
    }

    fn record_patch(&self, subresource: &str) {
        if let Some(health) = &self.health {
            health
                .metrics
                .record_patch(self.reconciler.name(), subresource);
        }
    }

    /// Requeue action after a failed reconcile of `key`
    ///
    /// Retryable errors back off exponentially with the number of consecutive
    /// failures; permanent errors requeue at the maximum delay.
    pub fn error_policy(&self, key: &ObjectKey, error: &Error) -> Action {
        let attempt = self.consecutive_errors(key).saturating_sub(1);
        let delay = self.backoff.delay_for_error(error, attempt);

        if error.is_retryable() {
            warn!(
                controller = self.reconciler.name(),
                object = %key,
                "Retryable error: {}, requeuing in {:?}",
                error,
                delay
            );
        } else {
            error!(
                controller = self.reconciler.name(),
                object = %key,
                "Non-retryable error: {}, requeuing in {:?}",
                error,
                delay
            );
        }

        Action::requeue(delay)
    }
}

/// Reconcile entry point for `kube::runtime::Controller::run`
pub async fn reconcile_object<K, R, S>(
    obj: Arc<K>,
    engine: Arc<PatchingReconciler<K, R, S>>,
) -> Result<Action>
where
    K: Object + StatusSubresource,
    R: ObjectReconciler<K>,
    S: Store,
{
    engine.reconcile(&ObjectKey::of(obj.as_ref())).await
}

/// Error policy entry point for `kube::runtime::Controller::run`
pub fn object_error_policy<K, R, S>(
    obj: Arc<K>,
    error: &Error,
    engine: Arc<PatchingReconciler<K, R, S>>,
) -> Action
where
    K: Object + StatusSubresource,
    R: ObjectReconciler<K>,
    S: Store,
{
    engine.error_policy(&ObjectKey::of(obj.as_ref()), error)
}

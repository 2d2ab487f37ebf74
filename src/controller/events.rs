//! Observability events attached to reconciled objects
//!
//! Publishing never fails a reconcile: delivery errors are logged and dropped.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::warn;

/// Severity of an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEvent {
    pub kind: EventKind,
    /// CamelCase machine-readable reason, e.g. `AppNotFound`
    pub reason: String,
    pub note: String,
    /// What the controller was doing, e.g. `Reconcile`
    pub action: String,
}

impl ObjectEvent {
    pub fn normal(reason: &str, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.to_string(),
            note: note.into(),
            action: "Reconcile".to_string(),
        }
    }

    pub fn warning(reason: &str, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.to_string(),
            note: note.into(),
            action: "Reconcile".to_string(),
        }
    }
}

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn publish(&self, reference: ObjectReference, event: ObjectEvent);
}

/// Publishes to the cluster through `kube::runtime::events`
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: Client, reporter: &str) -> Self {
        Self {
            recorder: Recorder::new(client, reporter.into()),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(&self, reference: ObjectReference, event: ObjectEvent) {
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        let result = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: Some(event.note),
                    action: event.action,
                    secondary: None,
                },
                &reference,
            )
            .await;

        if let Err(e) = result {
            warn!(
                reason = %event.reason,
                object = reference.name.as_deref().unwrap_or_default(),
                "Failed to publish event: {}",
                e
            );
        }
    }
}

/// Captures events in memory
#[derive(Default)]
pub struct MemoryEventRecorder {
    events: Mutex<Vec<(ObjectReference, ObjectEvent)>>,
}

impl MemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(ObjectReference, ObjectEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reasons of every captured event, in publication order
    pub fn reasons(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(_, event)| event.reason)
            .collect()
    }
}

#[async_trait]
impl EventRecorder for MemoryEventRecorder {
    async fn publish(&self, reference: ObjectReference, event: ObjectEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((reference, event));
    }
}

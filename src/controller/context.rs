use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ControllerConfig;
use crate::controller::events::EventRecorder;
use crate::store::Store;

/// Source of the current time; replaced in tests to step over TTL boundaries
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Shared context for the domain reconcilers
pub struct Context<S: Store> {
    pub store: Arc<S>,
    pub recorder: Arc<dyn EventRecorder>,
    pub config: Arc<ControllerConfig>,
    pub clock: Clock,
}

impl<S: Store> Context<S> {
    pub fn new(
        store: Arc<S>,
        recorder: Arc<dyn EventRecorder>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            store,
            recorder,
            config,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

impl<S: Store> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            recorder: self.recorder.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }
}

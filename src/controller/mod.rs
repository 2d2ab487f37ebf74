pub mod conditions;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod patch;
pub mod security_group;
pub mod task;
pub mod task_phase;

pub use conditions::{ConditionBuilder, ReadyConditionBuilder, find_condition, is_true, set_condition};
pub use context::{Clock, Context, system_clock};
pub use engine::{
    ObjectReconciler, PatchingReconciler, StatusSubresource, object_error_policy, reconcile_object,
};
pub use error::{BackoffConfig, Error, ErrorContext, Result};
pub use events::{EventKind, EventRecorder, KubeEventRecorder, MemoryEventRecorder, ObjectEvent};
pub use patch::{UpsertOutcome, merge_diff, upsert};
pub use security_group::{SECURITY_GROUP_FINALIZER, SecurityGroupReconciler};
pub use task::{TASK_CONTROLLER, TaskReconciler};
pub use task_phase::TaskPhase;

mod cf_app;
mod cf_build;
mod cf_process;
mod cf_security_group;
mod cf_task;
mod common;
mod network_policy;
mod task_workload;

pub use cf_app::*;
pub use cf_build::*;
pub use cf_process::*;
pub use cf_security_group::*;
pub use cf_task::*;
pub use common::*;
pub use network_policy::*;
pub use task_workload::*;

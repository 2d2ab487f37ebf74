pub mod common;
pub mod env;
pub mod network_policy;
pub mod task_workload;

pub use common::{owner_reference, set_owner_reference};
pub use env::{AppEnvBuilder, EnvBuilder};

pub mod clock;
pub mod store;
pub mod workload;

pub use workload::{error_policy, reconcile, Context, ReconcileError};

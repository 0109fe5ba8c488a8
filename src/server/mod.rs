//! Operational surface of the controller: probes, metrics, shutdown

pub mod health;
pub mod metrics;
pub mod shutdown;

pub use health::{run_health_server, ReadinessState};
pub use metrics::{create_metrics, ControllerMetrics, SharedMetrics};
pub use shutdown::wait_for_signal;

use crate::controller::store::WorkloadSnapshot;

/// Health verdict for a workload snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// Fewer ready replicas than desired; `deficit` is always positive
    Degraded { deficit: i32 },
}

/// Judge a workload's health from one snapshot
///
/// Pure and total: no I/O, no side effects. A workload scaled to zero (or
/// with no defined scale) is always healthy; scaling down is intentional,
/// not a failure.
pub fn evaluate(snapshot: &WorkloadSnapshot) -> HealthVerdict {
    if snapshot.desired_replicas <= 0 {
        return HealthVerdict::Healthy;
    }

    let deficit = snapshot.desired_replicas - snapshot.ready_replicas;
    if deficit > 0 {
        HealthVerdict::Degraded { deficit }
    } else {
        HealthVerdict::Healthy
    }
}

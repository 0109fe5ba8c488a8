//! KUNTO - workload auto-healing controller for Kubernetes
//!
//! Watches Deployments and force-replaces their pods whenever the ready
//! replica count falls below the desired count, letting the ReplicaSet
//! controller bring up fresh replacements.

pub mod controller;
pub mod server;

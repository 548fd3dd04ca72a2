//! Airlift Kube - Kubernetes integration for Airlift
//!
//! This crate provides:
//! - **Cluster Gateway**: discovery-backed lookup, server-side apply with
//!   two-phase dry-run, deletes, and readiness waits
//! - **Revision Store**: per-release history persisted as one Secret per
//!   revision in the system namespace
//! - **Ownership Registry**: the global canonical-name -> release mapping
//!   that arbitrates which release may mutate a resource
//! - **Release Reconciler**: the takeoff / descent / mayday / turbulence /
//!   blackbox state machine

pub mod client;
pub mod diff;
pub mod error;
pub mod output;
pub mod ownership;
pub mod readiness;
pub mod reconciler;
pub mod revisions;

pub use client::{ApplyManyOpts, ApplyOpts, ClusterClient, WaitOpts};
pub use error::{KubeError, Result};
pub use output::Output;
pub use ownership::OwnershipRegistry;
pub use reconciler::{
    BlackboxParams, DescentParams, FlightSpec, Reconciler, TakeoffParams, TurbulenceParams,
    evaluate_flight,
};
pub use revisions::{DEFAULT_SYSTEM_NAMESPACE, RevisionStore};

//! Airlift Core - foundational types for the WASM-powered Kubernetes package manager
//!
//! This crate provides the types shared by every other Airlift crate:
//! - `Resource`: a schemaless Kubernetes object with typed access to its identity
//! - `codec`: parsing of flight output into an ordered resource list
//! - `Revision` / `Revisions`: per-release history snapshots
//! - `MultiError`: ordered aggregation of per-resource failures within a phase

pub mod codec;
pub mod error;
pub mod resource;
pub mod revision;

pub use codec::{canonical_object_map, parse_resources};
pub use error::{CoreError, MultiError, Result};
pub use resource::{Resource, canonical_name_list, inject_managed_metadata, sort_by_canonical};
pub use revision::{Revision, Revisions, Source};

/// Tool name used for the apply field manager and managed-by label value.
pub const TOOL: &str = "airlift";

//! Airlift WASM - the flight executor
//!
//! A flight is a standalone WASI program whose stdout is a set of Kubernetes
//! resources. This crate runs flights in a capability-constrained sandbox:
//! argv, env, stdin, clocks, and a strong random source are forwarded;
//! filesystem, network, and every other host capability are withheld.

pub mod error;
pub mod loader;
pub mod sandbox;

pub use error::{Result, WasmError};
pub use loader::{FlightBinary, load_flight};
pub use sandbox::{ExecuteParams, execute};

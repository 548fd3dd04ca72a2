//! Flight execution error types
//!
//! Every execution failure carries the module's captured stderr so flight
//! authors can see their own diagnostics.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WasmError {
    #[error("failed to compile module: {0}")]
    Compile(String),

    #[error("failed to execute module: {message}: stderr: {stderr}")]
    Runtime { message: String, stderr: String },

    #[error("module exited with code {code}: stderr: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("flight execution cancelled: stderr: {stderr}")]
    Cancelled { stderr: String },

    #[error("module produced no output: stderr: {stderr}")]
    EmptyOutput { stderr: String },

    #[error("unsupported protocol {scheme:?}: flights load from file paths or http(s) only")]
    UnsupportedScheme { scheme: String },

    #[error("unexpected status code {status} fetching {url}")]
    FetchStatus { url: String, status: u16 },

    #[error("failed to fetch flight: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WasmError {
    /// True when the failure was caused by host-side cancellation rather
    /// than anything the module did.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WasmError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, WasmError>;

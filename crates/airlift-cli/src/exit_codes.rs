//! Standard exit codes for CLI operations

/// Success - also used for warnings (no-op takeoff, no turbulence).
pub const SUCCESS: u8 = 0;

/// General error - any failed operation.
pub const ERROR: u8 = 1;

/// Interrupted by the user.
pub const CANCELLED: u8 = 130;

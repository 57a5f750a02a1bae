//! Exit codes for the CLI

/// Success
pub const SUCCESS: i32 = 0;

/// Any target failed, or the build file or arguments were rejected
pub const ERROR: i32 = 1;

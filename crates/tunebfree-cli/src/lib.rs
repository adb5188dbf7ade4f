//! tuneBfree verification CLI library.
//!
//! Command implementations behind the `tunebfree-verify` binary.

pub mod commands;

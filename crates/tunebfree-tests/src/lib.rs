//! tuneBfree Harness End-to-End Test Infrastructure
//!
//! Synthetic fixture trees and suite builders shared by the integration
//! tests in `tests/`.
//!
//! ## Running Tests
//!
//! ```bash
//! # In-process pipeline tests (fake engine, in-memory provider)
//! cargo test -p tunebfree-tests
//!
//! # Against a built engine and an installed MTS-ESP library
//! TUNEBFREE_RUN_ENGINE_TESTS=1 cargo test -p tunebfree-tests -- --ignored
//! ```

pub mod fixtures;
pub mod harness;

// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice,
    dead_code
)]

//! Common test utilities and fixtures shared across all test targets
//!
//! Builders for the Cloud Foundry resources the controllers read, plus
//! harnesses that wire a reconciler to an in-memory store, an in-memory event
//! recorder and a clock the test controls.
//!
//! # Usage
//!
//! Include this module in your test file:
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod fixtures;

pub use fixtures::*;
pub use harness::*;

// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for the Cloud Foundry controllers
//!
//! This module contains unit tests for:
//! - The in-memory store (versions, generations, deletion guards, cascades)
//! - The patch-based reconciliation engine
//! - Condition handling
//! - The CFTask and CFSecurityGroup reconcilers, end to end over the store
//! - Network policy generation

#[path = "../common/mod.rs"]
mod common;

mod conditions;
mod security_group;

//! Test utilities for ObjectView
//!
//! An in-memory hub, fixtures for dumps and field maps, and async helpers
//! shared by unit and integration tests.

pub mod async_helpers;
pub mod fixtures;
pub mod mock_hub;

pub use async_helpers::*;
pub use fixtures::*;
pub use mock_hub::{HubCall, MockHub};

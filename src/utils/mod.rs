//! Shared types and helper functions

pub mod helpers;
pub mod types;

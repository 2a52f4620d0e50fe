//! Shared types and utilities used across the beacon crates.

pub mod mapping;
pub mod retry;

pub use {
    mapping::{InMemoryTeamMappingStore, TeamMapping, TeamMappingStore},
    retry::RetryPolicy,
};

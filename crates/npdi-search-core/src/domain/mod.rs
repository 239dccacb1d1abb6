//! Domain layer
//!
//! Contains the search orchestration logic and its event infrastructure.

pub mod events;
pub mod search;

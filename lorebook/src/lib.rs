//! # Lorebook
//!
//! The "scenario bible" crate - world-info entries, their trigger conditions,
//! scenarios, and chat message types. This crate is the single source of truth
//! for lore data and contains no matching or injection logic.

pub mod entries;
pub mod messages;
pub mod scenario;

pub use entries::*;
pub use messages::*;
pub use scenario::*;

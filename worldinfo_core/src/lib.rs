//! # World Info Core
//!
//! The matching and injection engine for lorebook scenarios. Given a
//! conversation's recent messages, it decides which world-info entries are
//! relevant, resolves recursive triggering between entries, ranks and
//! truncates the result under a token budget, and splices the selected lore
//! into the outgoing message list.
//!
//! ## Pipeline
//!
//! 1. **selector**: match entry triggers against the recent message window
//! 2. **expander**: re-scan activated entries' content for transitive lore
//! 3. **ranker**: order by priority and truncate to the token budget
//! 4. **injector**: splice the surviving lore around the system message
//!
//! The [`engine::WorldInfoEngine`] ties the stages together and adds an
//! optional memoization layer ([`cache::MatchCache`]) over the pure
//! structural-matching phase.
//!
//! ## Design Philosophy
//!
//! - **Pure stages**: matching, ranking and injection are pure functions of
//!   their inputs; all per-conversation mutable state lives in one place
//!   ([`context::ScanContext`]) owned by the caller
//! - **Recoverable by default**: malformed entries are skipped and warned
//!   once, never aborting a scan
//! - **Cache as optimization only**: results are identical with the cache
//!   disabled

pub mod cache;
pub mod context;
pub mod engine;
pub mod expander;
pub mod injector;
pub mod matcher;
pub mod ranker;
pub mod selector;

pub use cache::*;
pub use context::*;
pub use engine::*;
pub use expander::*;
pub use injector::*;
pub use matcher::*;
pub use ranker::*;
pub use selector::*;

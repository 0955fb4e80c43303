//! World-info entry definitions.

mod trigger;

pub use trigger::*;

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Unique identifier for world-info entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Create a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an entry ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a nil/empty entry ID (useful for defaults).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an entry's keywords are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Plain substring search (with optional logical-set directives).
    #[default]
    Contains,
    /// `/pattern/flags` literals.
    Regex,
    /// `word*` glob-style patterns.
    Wildcard,
}

/// Where an entry's content is placed relative to the system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryPosition {
    /// Immediately before the character/system message.
    #[default]
    Before,
    /// Immediately after the character/system message.
    After,
    /// No preference; follows the scenario-level strategy.
    Mixed,
}

/// A unit of lore that can be injected into a prompt when triggered.
///
/// The per-activation counters of a running conversation (trigger count,
/// last-triggered turn) are deliberately NOT stored here; they are
/// conversation-scoped state owned by the engine's scan context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldInfoEntry {
    pub id: EntryId,

    /// Author-facing name, also reported when the entry activates.
    pub title: String,

    /// The lore text injected into the prompt.
    pub content: String,

    /// Raw trigger keywords as authored; compiled lazily into a [`Trigger`].
    pub keywords: Vec<String>,

    /// Higher priority wins ranking ties and survives truncation longer.
    pub priority: i32,

    /// How many recent messages back this entry may scan.
    pub insert_depth: usize,

    /// Chance (0.0 - 1.0) that a structural match actually activates.
    pub probability: f32,

    pub match_type: MatchType,
    pub case_sensitive: bool,

    /// Wrap compiled patterns in word boundaries.
    pub whole_word: bool,

    pub is_active: bool,

    /// Fire at most once per conversation, then suppress permanently.
    pub trigger_once: bool,

    /// Maximum activations per conversation (`None` = unlimited).
    pub repeat_limit: Option<u32>,

    /// Turns to wait after an activation before firing again.
    pub cooldown: u32,

    pub position: EntryPosition,

    /// Free-text grouping label, non-functional.
    pub category: Option<String>,

    #[serde(skip)]
    compiled: OnceLock<Result<Trigger, TriggerError>>,
}

impl WorldInfoEntry {
    /// Create a new entry with the given title, content and keywords.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            title: title.into(),
            content: content.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            priority: 0,
            insert_depth: 2,
            probability: 1.0,
            match_type: MatchType::Contains,
            case_sensitive: false,
            whole_word: false,
            is_active: true,
            trigger_once: false,
            repeat_limit: None,
            cooldown: 0,
            position: EntryPosition::Before,
            category: None,
            compiled: OnceLock::new(),
        }
    }

    /// Set the ranking priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set how many recent messages this entry scans.
    pub fn with_insert_depth(mut self, depth: usize) -> Self {
        self.insert_depth = depth;
        self
    }

    /// Set the activation probability (clamped to 0.0 - 1.0).
    pub fn with_probability(mut self, probability: f32) -> Self {
        self.probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Set the keyword interpretation mode.
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    /// Set case-sensitive matching.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set whole-word matching.
    pub fn with_whole_word(mut self, whole_word: bool) -> Self {
        self.whole_word = whole_word;
        self
    }

    /// Activate or deactivate the entry.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Fire at most once per conversation.
    pub fn with_trigger_once(mut self, trigger_once: bool) -> Self {
        self.trigger_once = trigger_once;
        self
    }

    /// Cap activations per conversation.
    pub fn with_repeat_limit(mut self, limit: u32) -> Self {
        self.repeat_limit = Some(limit);
        self
    }

    /// Set the post-activation cooldown, in conversation turns.
    pub fn with_cooldown(mut self, turns: u32) -> Self {
        self.cooldown = turns;
        self
    }

    /// Set the injection position.
    pub fn with_position(mut self, position: EntryPosition) -> Self {
        self.position = position;
        self
    }

    /// Set the grouping category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// The compiled trigger condition, parsed on first access and cached
    /// for the lifetime of the entry.
    pub fn trigger(&self) -> Result<&Trigger, &TriggerError> {
        self.compiled
            .get_or_init(|| {
                Trigger::parse(
                    &self.keywords,
                    self.match_type,
                    self.case_sensitive,
                    self.whole_word,
                )
            })
            .as_ref()
    }
}

//! Scenario definitions - the container owning entries and injection settings.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::entries::{EntryId, WorldInfoEntry};

/// Unique identifier for scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioId(pub Uuid);

impl ScenarioId {
    /// Create a new random scenario ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a scenario ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a nil/empty scenario ID (useful for defaults).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scenario-level placement of injected lore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsertionStrategy {
    /// All selected lore goes before the system message.
    #[default]
    Before,
    /// All selected lore goes after the system message.
    After,
    /// Entries choose their own side via their `position` field.
    Mixed,
}

/// Injection settings carried by a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSettings {
    /// Maximum number of entries injected per prompt-assembly pass.
    pub max_entries: usize,

    /// Global cap on how many recent messages any entry may scan.
    pub scan_depth: usize,

    pub insertion_strategy: InsertionStrategy,

    /// Maximum estimated token cost the injector may add.
    pub budget_cap: usize,

    /// Re-scan activated entries' content for transitive triggers.
    pub recursive_scanning: bool,

    /// Bound on recursive re-scan depth.
    pub max_recursion_depth: u32,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            max_entries: 10,
            scan_depth: 4,
            insertion_strategy: InsertionStrategy::Before,
            budget_cap: 1024,
            recursive_scanning: true,
            max_recursion_depth: 3,
        }
    }
}

/// A scenario owns an ordered set of world-info entries plus the settings
/// that govern how they are matched and injected. Scenarios are the unit of
/// isolation; entries never cross scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub name: String,
    pub entries: Vec<WorldInfoEntry>,
    pub settings: ScenarioSettings,
}

impl Scenario {
    /// Create a new empty scenario with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ScenarioId::new(),
            name: name.into(),
            entries: Vec::new(),
            settings: ScenarioSettings::default(),
        }
    }

    /// Replace the scenario settings.
    pub fn with_settings(mut self, settings: ScenarioSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Append an entry, returning its ID.
    pub fn add_entry(&mut self, entry: WorldInfoEntry) -> EntryId {
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    /// Look up an entry by ID.
    pub fn entry(&self, id: EntryId) -> Option<&WorldInfoEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Iterate over active entries in authoring order.
    pub fn active_entries(&self) -> impl Iterator<Item = &WorldInfoEntry> {
        self.entries.iter().filter(|e| e.is_active)
    }

    /// Deserialize a scenario from the storage layer's JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the scenario to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Order-sensitive hash of everything that influences matching: the
    /// settings plus each entry's trigger-relevant fields. Feeds the match
    /// cache key, so edits to any entry invalidate cached results.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.settings.max_entries.hash(&mut hasher);
        self.settings.scan_depth.hash(&mut hasher);
        self.settings.insertion_strategy.hash(&mut hasher);
        self.settings.budget_cap.hash(&mut hasher);
        self.settings.recursive_scanning.hash(&mut hasher);
        self.settings.max_recursion_depth.hash(&mut hasher);

        for entry in &self.entries {
            entry.id.hash(&mut hasher);
            entry.keywords.hash(&mut hasher);
            entry.content.hash(&mut hasher);
            entry.match_type.hash(&mut hasher);
            entry.case_sensitive.hash(&mut hasher);
            entry.whole_word.hash(&mut hasher);
            entry.is_active.hash(&mut hasher);
            entry.insert_depth.hash(&mut hasher);
            entry.priority.hash(&mut hasher);
            entry.probability.to_bits().hash(&mut hasher);
            entry.trigger_once.hash(&mut hasher);
            entry.repeat_limit.hash(&mut hasher);
            entry.cooldown.hash(&mut hasher);
            entry.position.hash(&mut hasher);
        }

        hasher.finish()
    }
}

//! Entry Selector - decides which entries' triggers fire for a scan window.
//!
//! Selection splits into two phases. The *structural* phase is a pure
//! function of (entries, window text) and is the part the match cache may
//! memoize. The *lifecycle* phase applies per-conversation state (visited
//! set, cooldowns, repeat limits) and the probability roll, and always runs
//! live against the [`ScanContext`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use tracing::warn;

use lorebook::{ChatMessage, EntryId, Scenario, TriggerError, WorldInfoEntry};

use crate::context::ScanContext;
use crate::matcher;

/// A structural match: the trigger fired, before any lifecycle gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralMatch {
    pub entry_id: EntryId,
    pub matched_keywords: Vec<String>,
}

/// An activated entry, with the provenance callers log for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub entry_id: EntryId,
    pub title: String,
    pub matched_keywords: Vec<String>,
    pub priority: i32,
    /// Recursion depth at which the entry activated (0 = direct match).
    pub depth: u32,
}

/// Run the structural phase against the conversation window.
///
/// Each entry scans its own window: the last
/// `min(entry.insert_depth, settings.scan_depth)` messages.
pub fn structural_matches(scenario: &Scenario, messages: &[ChatMessage]) -> Vec<StructuralMatch> {
    scenario
        .active_entries()
        .filter_map(|entry| {
            let depth = entry.insert_depth.min(scenario.settings.scan_depth);
            let window = scan_window(messages, depth);
            structural_match(entry, &window)
        })
        .collect()
}

/// Run the structural phase against arbitrary text (used when re-scanning
/// activated entries' content during recursive expansion).
pub fn structural_matches_text(scenario: &Scenario, text: &str) -> Vec<StructuralMatch> {
    scenario
        .active_entries()
        .filter_map(|entry| structural_match(entry, text))
        .collect()
}

fn structural_match(entry: &WorldInfoEntry, text: &str) -> Option<StructuralMatch> {
    if entry.content.trim().is_empty() {
        warn_once(entry, "entry has no content");
        return None;
    }
    if let Err(err) = entry.trigger() {
        warn_malformed(entry, err);
        return None;
    }

    matcher::evaluate(text, entry).map(|matched_keywords| StructuralMatch {
        entry_id: entry.id,
        matched_keywords,
    })
}

/// Apply lifecycle gating and the probability roll to structural matches,
/// recording activations in the scan context.
pub fn apply_lifecycle(
    scenario: &Scenario,
    structural: &[StructuralMatch],
    ctx: &mut ScanContext,
    rng: &mut impl Rng,
    depth: u32,
) -> Vec<MatchResult> {
    let mut results = Vec::new();

    for found in structural {
        let Some(entry) = scenario.entry(found.entry_id) else {
            continue;
        };
        if ctx.is_visited(entry.id) || !ctx.is_eligible(entry) {
            continue;
        }
        // A structural match might still not fire: independent roll per
        // activation attempt. The field is clamped here, not trusted: the
        // builder clamps, but deserialized entries arrive with whatever the
        // storage layer holds, and an out-of-range roll would abort the
        // whole scan.
        let probability = f64::from(entry.probability).clamp(0.0, 1.0);
        if probability < 1.0 && !rng.random_bool(probability) {
            continue;
        }

        ctx.record_activation(entry.id);
        results.push(MatchResult {
            entry_id: entry.id,
            title: entry.title.clone(),
            matched_keywords: found.matched_keywords.clone(),
            priority: entry.priority,
            depth,
        });
    }

    results
}

/// Full selection for one scan window: structural phase plus lifecycle
/// phase, without the cache. This is the reference path the cached engine
/// must agree with.
pub fn select(
    scenario: &Scenario,
    messages: &[ChatMessage],
    ctx: &mut ScanContext,
    rng: &mut impl Rng,
) -> Vec<MatchResult> {
    let structural = structural_matches(scenario, messages);
    apply_lifecycle(scenario, &structural, ctx, rng, 0)
}

/// Join the last `depth` messages into one scan text.
fn scan_window(messages: &[ChatMessage], depth: usize) -> String {
    let start = messages.len().saturating_sub(depth);
    messages[start..]
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn warn_malformed(entry: &WorldInfoEntry, err: &TriggerError) {
    warn_once(entry, &err.to_string());
}

/// Warn about a broken entry once per process; a misauthored entry must not
/// spam the log on every turn.
fn warn_once(entry: &WorldInfoEntry, reason: &str) {
    static WARNED: OnceLock<Mutex<HashSet<EntryId>>> = OnceLock::new();

    let warned = WARNED.get_or_init(|| Mutex::new(HashSet::new()));
    let mut warned = warned.lock().unwrap_or_else(|e| e.into_inner());
    if warned.insert(entry.id) {
        warn!(entry = %entry.id, title = %entry.title, reason, "skipping malformed world-info entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebook::MatchType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn scenario_with(entries: Vec<WorldInfoEntry>) -> Scenario {
        let mut scenario = Scenario::new("test");
        for entry in entries {
            scenario.add_entry(entry);
        }
        scenario
    }

    #[test]
    fn test_select_basic_match() {
        let scenario = scenario_with(vec![
            WorldInfoEntry::new("Kingdom", "The kingdom of Eldra.", ["kingdom"]),
            WorldInfoEntry::new("Dragon", "Dragons are rare.", ["dragon"]),
        ]);
        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        let messages = vec![ChatMessage::user("I visited the kingdom")];
        let results = select(&scenario, &messages, &mut ctx, &mut rng());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Kingdom");
        assert_eq!(results[0].matched_keywords, vec!["kingdom"]);
        assert_eq!(results[0].depth, 0);
    }

    #[test]
    fn test_per_entry_scan_depth() {
        // "castle" appears two messages back; one entry can see it, the
        // other scans only the last message.
        let shallow = WorldInfoEntry::new("Shallow", "lore", ["castle"]).with_insert_depth(1);
        let deep = WorldInfoEntry::new("Deep", "lore", ["castle"]).with_insert_depth(3);
        let scenario = scenario_with(vec![shallow, deep]);

        let messages = vec![
            ChatMessage::user("we rode to the castle"),
            ChatMessage::assistant("the gates opened"),
        ];
        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        let results = select(&scenario, &messages, &mut ctx, &mut rng());
        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Deep"]);
    }

    #[test]
    fn test_global_scan_depth_caps_entry_depth() {
        let entry = WorldInfoEntry::new("Deep", "lore", ["castle"]).with_insert_depth(10);
        let mut scenario = scenario_with(vec![entry]);
        scenario.settings.scan_depth = 1;

        let messages = vec![
            ChatMessage::user("we rode to the castle"),
            ChatMessage::assistant("the gates opened"),
        ];
        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        assert!(select(&scenario, &messages, &mut ctx, &mut rng()).is_empty());
    }

    #[test]
    fn test_zero_probability_never_activates() {
        let entry = WorldInfoEntry::new("Ghost", "lore", ["ghost"]).with_probability(0.0);
        let scenario = scenario_with(vec![entry]);
        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        let messages = vec![ChatMessage::user("a ghost appears")];
        for _ in 0..20 {
            assert!(select(&scenario, &messages, &mut ctx, &mut rng()).is_empty());
        }
    }

    #[test]
    fn test_out_of_range_probability_does_not_abort_the_scan() {
        // Stored entries bypass the builder clamp; a scenario loaded from
        // JSON can carry any float and must still scan safely.
        let mut scenario = scenario_with(vec![
            WorldInfoEntry::new("Never", "lore a", ["kingdom"]),
            WorldInfoEntry::new("Always", "lore b", ["kingdom"]),
        ]);
        scenario.entries[0].probability = -0.5;
        scenario.entries[1].probability = 1.5;

        let json = scenario.to_json().unwrap();
        let scenario = Scenario::from_json(&json).unwrap();

        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        let messages = vec![ChatMessage::user("I visited the kingdom")];
        let results = select(&scenario, &messages, &mut ctx, &mut rng());

        // Below-range never fires, above-range always fires.
        let titles: Vec<_> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Always"]);
    }

    #[test]
    fn test_full_probability_skips_the_roll() {
        // probability 1.0 must activate regardless of the rng stream.
        let entry = WorldInfoEntry::new("Sure", "lore", ["sure"]);
        let scenario = scenario_with(vec![entry]);

        for seed in 0..10 {
            let mut ctx = ScanContext::new();
            ctx.begin_turn();
            let mut rng = StdRng::seed_from_u64(seed);
            let messages = vec![ChatMessage::user("sure thing")];
            assert_eq!(select(&scenario, &messages, &mut ctx, &mut rng).len(), 1);
        }
    }

    #[test]
    fn test_malformed_entry_is_skipped_not_fatal() {
        let bad = WorldInfoEntry::new("Bad", "lore", ["/[unclosed/"])
            .with_match_type(MatchType::Regex);
        let good = WorldInfoEntry::new("Good", "lore", ["kingdom"]);
        let scenario = scenario_with(vec![bad, good]);
        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        let messages = vec![ChatMessage::user("kingdom [unclosed")];
        let results = select(&scenario, &messages, &mut ctx, &mut rng());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Good");
    }

    #[test]
    fn test_empty_content_entry_is_skipped() {
        let empty = WorldInfoEntry::new("Empty", "   ", ["kingdom"]);
        let scenario = scenario_with(vec![empty]);
        let mut ctx = ScanContext::new();
        ctx.begin_turn();

        let messages = vec![ChatMessage::user("the kingdom")];
        assert!(select(&scenario, &messages, &mut ctx, &mut rng()).is_empty());
    }

    #[test]
    fn test_visited_entry_not_reselected() {
        let entry = WorldInfoEntry::new("Kingdom", "lore", ["kingdom"]);
        let scenario = scenario_with(vec![entry]);
        let mut ctx = ScanContext::new();
        ctx.begin_turn();
        ctx.begin_pass();

        let messages = vec![ChatMessage::user("the kingdom")];
        assert_eq!(select(&scenario, &messages, &mut ctx, &mut rng()).len(), 1);
        // Second call in the same pass: already visited.
        assert!(select(&scenario, &messages, &mut ctx, &mut rng()).is_empty());
    }

    #[test]
    fn test_activation_records_counters() {
        let entry = WorldInfoEntry::new("Kingdom", "lore", ["kingdom"]);
        let id = entry.id;
        let scenario = scenario_with(vec![entry]);
        let mut ctx = ScanContext::new();

        let messages = vec![ChatMessage::user("the kingdom")];
        for expected in 1..=3u32 {
            ctx.begin_turn();
            ctx.begin_pass();
            select(&scenario, &messages, &mut ctx, &mut rng());
            assert_eq!(ctx.trigger_count(id), expected);
        }
        assert_eq!(ctx.last_triggered_turn(id), Some(3));
    }
}

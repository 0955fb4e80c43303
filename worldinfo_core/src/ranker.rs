//! Budget Ranker/Truncator - orders activated entries and fits them to a
//! token budget.
//!
//! The token cost is a character-count heuristic, not a tokenizer: roughly
//! four ASCII characters per token, with non-ASCII characters (CJK and the
//! like tokenize far denser) counted one token each. It is documented as an
//! approximation; what matters is that it is monotonic in content length so
//! truncation is deterministic. Swapping in a real tokenizer means replacing
//! [`estimate_tokens`] only.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use lorebook::{EntryPosition, Scenario};

use crate::selector::MatchResult;

/// An entry that survived ranking and truncation, ready for injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub result: MatchResult,
    pub content: String,
    pub position: EntryPosition,
    pub estimated_tokens: usize,
}

/// Estimate the prompt-size cost of a piece of text.
///
/// Monotonic in content length: appending characters never lowers the
/// estimate. Empty or whitespace-only text costs nothing.
pub fn estimate_tokens(text: &str) -> usize {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    let mut ascii = 0usize;
    let mut wide = 0usize;
    for ch in text.chars() {
        if ch.is_ascii() {
            ascii += 1;
        } else {
            wide += 1;
        }
    }
    ascii.div_ceil(4) + wide
}

/// Order activated entries and greedily select a prefix under the budget.
///
/// Sort key: priority descending, recursion depth ascending (shallower
/// wins), original scan order ascending (stable tie-break). The walk stops
/// at the first entry that would overflow the budget; it does not skip and
/// continue, so the output is always a prefix of the ranked order.
pub fn rank(matches: Vec<MatchResult>, scenario: &Scenario, budget: usize) -> Vec<RankedEntry> {
    let mut candidates: Vec<(usize, MatchResult)> =
        matches.into_iter().enumerate().collect();

    candidates.sort_by_key(|(order, result)| (Reverse(result.priority), result.depth, *order));

    let max_entries = scenario.settings.max_entries;
    let mut selected = Vec::new();
    let mut spent = 0usize;

    for (_, result) in candidates {
        if selected.len() >= max_entries {
            break;
        }
        let Some(entry) = scenario.entry(result.entry_id) else {
            // Activated against a stale pool; nothing to inject.
            continue;
        };
        if entry.content.trim().is_empty() {
            continue;
        }

        let cost = estimate_tokens(&entry.content);
        if spent + cost > budget {
            break;
        }
        spent += cost;
        selected.push(RankedEntry {
            result,
            content: entry.content.clone(),
            position: entry.position,
            estimated_tokens: cost,
        });
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebook::{EntryId, WorldInfoEntry};

    fn result(entry: &WorldInfoEntry, depth: u32) -> MatchResult {
        MatchResult {
            entry_id: entry.id,
            title: entry.title.clone(),
            matched_keywords: entry.keywords.clone(),
            priority: entry.priority,
            depth,
        }
    }

    fn scenario_with(entries: Vec<WorldInfoEntry>) -> Scenario {
        let mut scenario = Scenario::new("test");
        for entry in entries {
            scenario.add_entry(entry);
        }
        scenario
    }

    #[test]
    fn test_estimate_ascii() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("   "), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_wide_chars_cost_more() {
        let ascii = estimate_tokens("aaaa");
        let wide = estimate_tokens("龍龍龍龍");
        assert!(wide > ascii);
        assert_eq!(wide, 4);
    }

    #[test]
    fn test_estimate_monotonic() {
        let mut text = String::new();
        let mut prev = 0;
        for _ in 0..200 {
            text.push('x');
            let est = estimate_tokens(&text);
            assert!(est >= prev);
            prev = est;
        }
    }

    #[test]
    fn test_priority_ordering() {
        let low = WorldInfoEntry::new("Low", "low lore", ["a"]).with_priority(10);
        let high = WorldInfoEntry::new("High", "high lore", ["b"]).with_priority(90);
        let matches = vec![result(&low, 0), result(&high, 0)];
        let scenario = scenario_with(vec![low, high]);

        let ranked = rank(matches, &scenario, 1000);
        let titles: Vec<_> = ranked.iter().map(|r| r.result.title.as_str()).collect();
        assert_eq!(titles, vec!["High", "Low"]);
    }

    #[test]
    fn test_shallower_depth_wins_priority_tie() {
        let a = WorldInfoEntry::new("DeepFind", "lore a", ["a"]).with_priority(50);
        let b = WorldInfoEntry::new("DirectFind", "lore b", ["b"]).with_priority(50);
        let matches = vec![result(&a, 2), result(&b, 0)];
        let scenario = scenario_with(vec![a, b]);

        let ranked = rank(matches, &scenario, 1000);
        let titles: Vec<_> = ranked.iter().map(|r| r.result.title.as_str()).collect();
        assert_eq!(titles, vec!["DirectFind", "DeepFind"]);
    }

    #[test]
    fn test_scan_order_is_final_tie_break() {
        let a = WorldInfoEntry::new("First", "lore a", ["a"]).with_priority(50);
        let b = WorldInfoEntry::new("Second", "lore b", ["b"]).with_priority(50);
        let matches = vec![result(&a, 0), result(&b, 0)];
        let scenario = scenario_with(vec![a, b]);

        let ranked = rank(matches, &scenario, 1000);
        let titles: Vec<_> = ranked.iter().map(|r| r.result.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_budget_truncation_is_prefix() {
        // Costs: 40 chars -> 10 tokens each.
        let content = "x".repeat(40);
        let a = WorldInfoEntry::new("A", content.clone(), ["a"]).with_priority(90);
        let b = WorldInfoEntry::new("B", content.clone(), ["b"]).with_priority(80);
        let c = WorldInfoEntry::new("C", content, ["c"]).with_priority(70);
        let matches = vec![result(&a, 0), result(&b, 0), result(&c, 0)];
        let scenario = scenario_with(vec![a, b, c]);

        let ranked = rank(matches, &scenario, 25);
        let titles: Vec<_> = ranked.iter().map(|r| r.result.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);

        let total: usize = ranked.iter().map(|r| r.estimated_tokens).sum();
        assert!(total <= 25);
    }

    #[test]
    fn test_truncation_stops_rather_than_skips() {
        // B is too big; C would fit, but the walk must stop at B so output
        // order stays a predictable prefix.
        let a = WorldInfoEntry::new("A", "x".repeat(8), ["a"]).with_priority(90);
        let b = WorldInfoEntry::new("B", "x".repeat(400), ["b"]).with_priority(80);
        let c = WorldInfoEntry::new("C", "x".repeat(8), ["c"]).with_priority(70);
        let matches = vec![result(&a, 0), result(&b, 0), result(&c, 0)];
        let scenario = scenario_with(vec![a, b, c]);

        let ranked = rank(matches, &scenario, 10);
        let titles: Vec<_> = ranked.iter().map(|r| r.result.title.as_str()).collect();
        assert_eq!(titles, vec!["A"]);
    }

    #[test]
    fn test_max_entries_cap() {
        let entries: Vec<_> = (0..5)
            .map(|i| WorldInfoEntry::new(format!("E{}", i), "lore", ["k"]).with_priority(50 - i))
            .collect();
        let matches: Vec<_> = entries.iter().map(|e| result(e, 0)).collect();
        let mut scenario = scenario_with(entries);
        scenario.settings.max_entries = 2;

        let ranked = rank(matches, &scenario, 1000);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_unknown_entry_excluded() {
        let a = WorldInfoEntry::new("A", "lore", ["a"]);
        let scenario = scenario_with(vec![a.clone()]);

        let stale = MatchResult {
            entry_id: EntryId::new(),
            title: "Gone".to_string(),
            matched_keywords: vec![],
            priority: 100,
            depth: 0,
        };
        let ranked = rank(vec![stale, result(&a, 0)], &scenario, 1000);

        let titles: Vec<_> = ranked.iter().map(|r| r.result.title.as_str()).collect();
        assert_eq!(titles, vec!["A"]);
    }

    #[test]
    fn test_zero_budget_selects_nothing() {
        let a = WorldInfoEntry::new("A", "lore", ["a"]);
        let matches = vec![result(&a, 0)];
        let scenario = scenario_with(vec![a]);

        assert!(rank(matches, &scenario, 0).is_empty());
    }
}

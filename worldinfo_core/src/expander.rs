//! Recursive Expander - transitive triggering between entries.
//!
//! Newly activated entries' content becomes scan text for another selection
//! pass, so lore can pull in the lore it mentions. Expansion is bounded two
//! ways: the scan context's visited set makes cycles terminate, and
//! `max_recursion_depth` caps how deep the chain may grow. Hitting the cap
//! is an expected condition, not an error.

use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

use lorebook::Scenario;

use crate::context::ScanContext;
use crate::selector::{apply_lifecycle, structural_matches_text, MatchResult};

/// Expand an initial activation set with transitively triggered entries.
///
/// Each result keeps the shallowest depth at which its entry activated
/// (re-activation at a deeper level is impossible: activation marks the
/// entry visited). With `recursive_scanning` off this is a pass-through.
/// An optional soft deadline stops descending early when the latency budget
/// is already spent.
pub fn expand(
    initial: Vec<MatchResult>,
    scenario: &Scenario,
    ctx: &mut ScanContext,
    rng: &mut impl Rng,
    soft_deadline: Option<Duration>,
) -> Vec<MatchResult> {
    if !scenario.settings.recursive_scanning || initial.is_empty() {
        return initial;
    }

    let started = Instant::now();
    let mut all = initial;
    // Entries activated by the previous pass; their content is the next
    // pass's scan text.
    let mut frontier: Vec<_> = all.iter().map(|m| m.entry_id).collect();

    for depth in 1..=scenario.settings.max_recursion_depth {
        if frontier.is_empty() {
            break;
        }
        if let Some(deadline) = soft_deadline {
            if started.elapsed() >= deadline {
                debug!(depth, "soft deadline reached, capping recursive expansion");
                break;
            }
        }

        let scan_text = frontier
            .iter()
            .filter_map(|id| scenario.entry(*id))
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let structural = structural_matches_text(scenario, &scan_text);
        let newly_activated = apply_lifecycle(scenario, &structural, ctx, rng, depth);

        frontier = newly_activated.iter().map(|m| m.entry_id).collect();
        all.extend(newly_activated);
    }

    all
}

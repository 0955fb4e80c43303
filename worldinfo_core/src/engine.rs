//! The engine - wires select, expand, rank and inject into one pipeline.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use lorebook::{ChatMessage, EntryId, Scenario};

use crate::cache::{scan_key, CacheConfig, MatchCache};
use crate::context::ScanContext;
use crate::expander::expand;
use crate::injector::inject;
use crate::ranker::rank;
use crate::selector::{apply_lifecycle, structural_matches, MatchResult};

/// Engine-level configuration (scenario settings travel with the scenario).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed seed for probability rolls; `None` seeds from the OS. Fixing
    /// the seed makes a whole pipeline run reproducible.
    pub rng_seed: Option<u64>,

    /// Soft latency budget for recursive expansion; exceeding it caps
    /// recursion early instead of blocking the chat turn.
    pub soft_deadline: Option<Duration>,

    /// Match cache bounds; `None` disables caching entirely.
    pub cache: Option<CacheConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            soft_deadline: None,
            cache: Some(CacheConfig::default()),
        }
    }
}

/// What a pipeline run produced, for the caller to hand to the LLM layer
/// and to log which lore fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionOutcome {
    /// The rewritten message list, lore spliced in.
    pub messages: Vec<ChatMessage>,

    /// Every entry that activated, with matched keywords and depth,
    /// including ones the budget later truncated away.
    pub activations: Vec<MatchResult>,

    /// The entries whose content was actually injected, in injection order.
    pub injected: Vec<EntryId>,

    /// Estimated token cost of the injected lore.
    pub tokens_used: usize,
}

/// The world-info matching and injection engine.
///
/// Stateless apart from the optional match cache, so one engine instance
/// serves scans for any number of scenarios concurrently. Scans for the
/// same conversation serialize through the `&mut ScanContext` they share.
pub struct WorldInfoEngine {
    config: EngineConfig,
    cache: Option<MatchCache>,
}

impl WorldInfoEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        let cache = config.cache.map(MatchCache::new);
        Self { config, cache }
    }

    /// Create an engine with default configuration (cache on, OS-seeded).
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Select and recursively expand, without ranking or injection.
    ///
    /// An unknown scenario (no entries) simply yields an empty set.
    pub fn scan(
        &self,
        scenario: &Scenario,
        messages: &[ChatMessage],
        ctx: &mut ScanContext,
    ) -> Vec<MatchResult> {
        ctx.begin_pass();

        let structural = match &self.cache {
            Some(cache) => cache.get_or_compute(scan_key(scenario, messages), || {
                structural_matches(scenario, messages)
            }),
            None => structural_matches(scenario, messages),
        };

        let mut rng = self.make_rng();
        let initial = apply_lifecycle(scenario, &structural, ctx, &mut rng, 0);
        expand(initial, scenario, ctx, &mut rng, self.config.soft_deadline)
    }

    /// Run the full pipeline: select, expand, rank to the scenario's token
    /// budget, and splice the surviving lore into a new message list.
    pub fn process(
        &self,
        scenario: &Scenario,
        messages: &[ChatMessage],
        ctx: &mut ScanContext,
    ) -> InjectionOutcome {
        let activations = self.scan(scenario, messages, ctx);

        let ranked = rank(activations.clone(), scenario, scenario.settings.budget_cap);
        let tokens_used = ranked.iter().map(|r| r.estimated_tokens).sum();
        ctx.set_tokens_spent(tokens_used);

        let messages = inject(messages, &ranked, scenario.settings.insertion_strategy);

        InjectionOutcome {
            messages,
            activations,
            injected: ranked.iter().map(|r| r.result.entry_id).collect(),
            tokens_used,
        }
    }

    fn make_rng(&self) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

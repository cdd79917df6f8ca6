//! The external collaborators a run talks to, bundled so they can be built
//! from config in production and injected as fakes in tests.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{CatalogDb, CatalogHandle};
use crate::competitors::{CommandCompetitorSearch, CompetitorSearch, NoCompetitorSearch};
use crate::config::Config;
use crate::embedding::{Embedder, HashingEmbedder};
use crate::invoker::{DryRunReasoning, Invoker, ReasoningService};
use crate::search::{SimilaritySearch, VectorIndex};
use crate::signals::{CommandSource, SignalCollector, StaticSource};

use super::prompts::PromptSet;

#[derive(Clone)]
pub struct Collaborators {
    pub reasoning: Arc<dyn ReasoningService>,
    pub catalog: CatalogHandle,
    pub search: Arc<dyn SimilaritySearch>,
    pub collector: Arc<SignalCollector>,
    pub competitors: Arc<dyn CompetitorSearch>,
    pub embedder: Arc<dyn Embedder>,
    pub prompts: PromptSet,
}

/// Signal sources for every configured name. Names without a command get a
/// canned source in dry-run mode and are left unregistered otherwise.
pub fn build_collector(config: &Config) -> SignalCollector {
    let section = &config.toml.signals;
    let timeout = Duration::from_secs(section.source_timeout_sec);
    let mut collector = SignalCollector::new(section.always.clone(), timeout);
    for name in section.always.iter().chain(section.pool.iter()) {
        match section.commands.get(name) {
            Some(command) => {
                collector.register(Arc::new(CommandSource::new(name, command, timeout)));
            }
            None if config.dry_run => collector.register(Arc::new(StaticSource::sample(name))),
            None => {}
        }
    }
    collector
}

impl Collaborators {
    /// Construct everything from config. Returns every problem found rather
    /// than stopping at the first.
    pub async fn build(config: &Config, needs_collection: bool) -> Result<Self, Vec<String>> {
        let mut failures = Vec::new();

        let collector = build_collector(config);
        if needs_collection {
            for name in collector.missing_sources(&config.toml.signals.pool) {
                failures.push(format!("Signal source '{}' has no command configured", name));
            }
        }

        let prompts = match PromptSet::load(&config.prompts_dir) {
            Ok(prompts) => Some(prompts),
            Err(e) => {
                failures.push(format!("Prompt templates unavailable: {:#}", e));
                None
            }
        };

        let catalog = match CatalogDb::open(&config.catalog_db) {
            Ok(db) => Some(CatalogHandle::new(db)),
            Err(e) => {
                failures.push(format!("Catalog unavailable: {:#}", e));
                None
            }
        };

        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
        let search = match &catalog {
            Some(handle) => match handle.call(|db| db.list_active_resources()).await {
                Ok(resources) => Some(Arc::new(VectorIndex::build(embedder.clone(), &resources))),
                Err(e) => {
                    failures.push(format!("Catalog query failed: {:#}", e));
                    None
                }
            },
            None => None,
        };

        let reasoning: Arc<dyn ReasoningService> = if config.dry_run {
            Arc::new(DryRunReasoning::new())
        } else {
            Arc::new(Invoker::from_config(
                &config.reasoning_cmd,
                &config.toml.reasoning,
            ))
        };

        let validation = &config.toml.validation;
        let competitors: Arc<dyn CompetitorSearch> = match &validation.competitor_command {
            Some(command) if !config.dry_run => Arc::new(CommandCompetitorSearch::new(
                command,
                Duration::from_secs(validation.competitor_timeout_sec),
            )),
            _ => Arc::new(NoCompetitorSearch),
        };

        match (catalog, search, prompts) {
            (Some(catalog), Some(search), Some(prompts)) if failures.is_empty() => Ok(Self {
                reasoning,
                catalog,
                search,
                collector: Arc::new(collector),
                competitors,
                embedder,
                prompts,
            }),
            _ => Err(failures),
        }
    }
}

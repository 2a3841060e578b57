use super::outcome::{CacheSource, Evaluation, QueryOutcome};
use super::respond::{NO_RESULTS_ANSWER, dedup_consecutive_lines, fallback_answer};
use crate::cache::{BoundedTtlCache, CacheStats, KeyNormalizer, KeyedCache, SemanticResultCache, StrategyCache};
use crate::config::AgendaConfig;
use crate::context::{ConversationContext, DEFAULT_MAX_HISTORY, Turn};
use crate::error::{ErrorKind, QueryFailure};
use crate::llm::{GeminiClient, LanguageModel, LlmRequest, Purpose, UnconfiguredModel, parse_structured};
use crate::prompts::{self, PromptContext};
use crate::store::{ContactStore, SchemaPreview, SqlOutcome, SqlQuery, SqliteContactStore};
use crate::strategy::SearchStrategy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default automatic refinement attempts per query.
pub const DEFAULT_MAX_REFINEMENTS: u32 = 1;

/// Statistics for both caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheReport {
    /// Semantic result cache.
    pub semantic: CacheStats,
    /// Strategy fingerprint cache.
    pub strategy: CacheStats,
    /// Whether the semantic cache is consulted.
    pub semantic_enabled: bool,
}

/// Where a cached outcome is looked up and stored.
enum CacheRoute<'a> {
    Semantic(&'a str),
    Strategy,
}

/// Runs one question end to end: analyze, cache lookup, search, evaluate,
/// refine (bounded), respond, cache store.
///
/// Every collaborator failure is turned into a [`QueryOutcome`] carrying a
/// [`QueryFailure`]; [`process`](Self::process) never returns an error.
pub struct QueryOrchestrator {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn ContactStore>,
    semantic: SemanticResultCache,
    strategies: StrategyCache,
    max_refinements: u32,
    max_history: usize,
    max_results_display: usize,
    table: String,
}

impl QueryOrchestrator {
    /// Orchestrator over explicit collaborators and caches.
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn ContactStore>,
        semantic: SemanticResultCache,
        strategies: StrategyCache,
    ) -> Self {
        Self {
            llm,
            store,
            semantic,
            strategies,
            max_refinements: DEFAULT_MAX_REFINEMENTS,
            max_history: DEFAULT_MAX_HISTORY,
            max_results_display: 50,
            table: "contactos".to_string(),
        }
    }

    /// Production wiring: Gemini client, SQLite store, file-backed caches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the API key or table name is invalid.
    pub fn from_config(config: &AgendaConfig) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(&config.llm)?);
        let store: Arc<dyn ContactStore> = Arc::new(SqliteContactStore::from_config(&config.database)?);
        Ok(Self::with_collaborators(config, llm, store))
    }

    /// Wiring for cache administration (statistics, clearing): the SQLite store
    /// and file-backed caches, without a language model.
    ///
    /// Questions asked through this orchestrator fail at the analyze step, so
    /// it needs no API key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the table name is invalid.
    pub fn for_cache_admin(config: &AgendaConfig) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> =
            Arc::new(UnconfiguredModel::new("no language model is configured for cache administration"));
        let store: Arc<dyn ContactStore> = Arc::new(SqliteContactStore::from_config(&config.database)?);
        Ok(Self::with_collaborators(config, llm, store))
    }

    /// Caches and limits from `config`, collaborators supplied by the caller.
    pub fn with_collaborators(
        config: &AgendaConfig,
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn ContactStore>,
    ) -> Self {
        let cache = &config.cache;
        let save_interval = Duration::from_secs(cache.save_interval_secs);
        let ttl = (cache.semantic_ttl_secs > 0).then(|| Duration::from_secs(cache.semantic_ttl_secs));

        let semantic_store = BoundedTtlCache::new(cache.semantic_max_size, ttl)
            .with_file(&cache.semantic_file, save_interval);
        let strategy_store = BoundedTtlCache::new(cache.strategy_max_size, None)
            .with_file(&cache.strategy_file, save_interval)
            .with_disk_compaction(QueryOutcome::compact);

        let normalizer = Arc::new(KeyNormalizer::new(Arc::clone(&llm)));
        let semantic = KeyedCache::semantic(normalizer, semantic_store, cache.semantic_enabled);
        let strategies = KeyedCache::strategy(strategy_store);

        Self::new(llm, store, semantic, strategies)
            .with_max_refinements(config.pipeline.max_refinements)
            .with_max_history(config.pipeline.max_history)
            .with_max_results_display(config.pipeline.max_results_display)
            .with_table(config.database.table.clone())
    }

    /// Set the refinement budget.
    #[must_use]
    pub const fn with_max_refinements(mut self, budget: u32) -> Self {
        self.max_refinements = budget;
        self
    }

    /// Set how many earlier turns prompts embed, most recent kept.
    #[must_use]
    pub const fn with_max_history(mut self, turns: usize) -> Self {
        self.max_history = turns;
        self
    }

    /// Set how many rows prompts embed.
    #[must_use]
    pub const fn with_max_results_display(mut self, rows: usize) -> Self {
        self.max_results_display = rows;
        self
    }

    /// Set the table name shown to the model.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Answer `query` and, when it succeeded, record the turn in `context`.
    pub async fn ask(&self, query: &str, context: &mut ConversationContext) -> QueryOutcome {
        let outcome = self.process(query, &context.turns()).await;
        if !outcome.is_error() {
            context.record(query, outcome.response.clone());
        }
        outcome
    }

    /// Answer `query` given earlier turns, oldest first.
    ///
    /// Only the last `max_history` turns reach the prompts.
    pub async fn process(&self, query: &str, history: &[Turn]) -> QueryOutcome {
        let started = Instant::now();
        info!(event = "query_received", query, history = history.len());

        let outcome = self.run(query, history).await;

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome.error {
            Some(failure) => warn!(
                event = "query_failed",
                kind = %failure.kind,
                error = %failure.message,
                elapsed_ms,
            ),
            None => info!(
                event = "response_generated",
                from_cache = ?outcome.from_cache,
                refined = outcome.refined,
                degraded = outcome.degraded.len(),
                elapsed_ms,
            ),
        }
        outcome
    }

    async fn run(&self, query: &str, history: &[Turn]) -> QueryOutcome {
        if let Err(e) = self.store.check_available().await {
            return QueryOutcome::failed(query, QueryFailure::from_error(ErrorKind::DataUnavailable, &e));
        }

        let preview = match self.store.schema_preview().await {
            Ok(preview) => preview,
            Err(e) => {
                warn!(error = %e, "schema preview unavailable; prompting without it");
                SchemaPreview::default()
            },
        };
        let history = &history[history.len().saturating_sub(self.max_history)..];
        let ctx = PromptContext {
            preview: &preview,
            history,
            table: &self.table,
            max_rows: self.max_results_display,
        };

        let mut strategy = match self.analyze(query, &ctx).await {
            Ok(strategy) => strategy,
            Err(e) => {
                return QueryOutcome::failed(query, QueryFailure::from_error(ErrorKind::AnalysisFailure, &e));
            },
        };
        debug!(kind = %strategy.kind, names = ?strategy.candidate_names, "analyzed query");

        let mut budget = self.max_refinements;
        let mut original_strategy: Option<SearchStrategy> = None;
        let mut degraded = Vec::new();

        let (search, rows, evaluation) = loop {
            if let Some(mut hit) = self.lookup(&strategy).await {
                hit.query = query.to_string();
                if original_strategy.is_some() {
                    hit.refined = true;
                    hit.original_strategy = original_strategy;
                }
                return hit;
            }

            let search = match self.generate_search(&strategy, &ctx).await {
                Ok(search) => search,
                Err(e) => {
                    return QueryOutcome {
                        strategy: Some(strategy),
                        original_strategy,
                        refined: budget < self.max_refinements,
                        ..QueryOutcome::failed(
                            query,
                            QueryFailure::from_error(ErrorKind::SearchGenerationFailure, &e),
                        )
                    };
                },
            };

            let rows = match self.store.run_sql(&search.sql, &search.parameters).await {
                Ok(rows) => rows,
                Err(e) => {
                    return QueryOutcome {
                        strategy: Some(strategy),
                        search: Some(search),
                        original_strategy,
                        refined: budget < self.max_refinements,
                        ..QueryOutcome::failed(
                            query,
                            QueryFailure::from_error(ErrorKind::SearchExecutionFailure, &e),
                        )
                    };
                },
            };

            let evaluation = match self.evaluate(query, &strategy, &rows, &ctx).await {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(error = %e, "evaluation failed; using row-count heuristic");
                    degraded.push(ErrorKind::EvaluationFailure);
                    Evaluation::heuristic(rows.total)
                },
            };

            if !evaluation.satisfactory && rows.total == 0 {
                if let Some(replacement) = evaluation.replacement_strategy() {
                    if budget > 0 {
                        budget -= 1;
                        info!(event = "refinement_attempt", remaining = budget, kind = %replacement.kind);
                        original_strategy.get_or_insert(strategy);
                        strategy = replacement;
                        continue;
                    }
                    debug!("refinement proposed but budget is spent");
                }
            }

            break (search, rows, evaluation);
        };

        let refined = original_strategy.is_some();
        if refined {
            if rows.total == 0 {
                info!(event = "refinement_exhausted", attempts = self.max_refinements - budget);
                return QueryOutcome {
                    query: query.to_string(),
                    response: NO_RESULTS_ANSWER.to_string(),
                    strategy: Some(strategy),
                    search: Some(search),
                    rows: Some(rows),
                    evaluation: Some(evaluation),
                    refined,
                    original_strategy,
                    degraded,
                    ..QueryOutcome::default()
                };
            }
            info!(event = "refinement_succeeded", total = rows.total);
        }

        let (response, respond_ok) = match self.respond(query, &strategy, &rows, &evaluation, &ctx).await {
            Ok(text) => (text, true),
            Err(e) => {
                warn!(error = %e, "response generation failed; using templated answer");
                degraded.push(ErrorKind::ResponseGenerationFailure);
                (fallback_answer(&strategy, &rows), false)
            },
        };

        let outcome = QueryOutcome {
            query: query.to_string(),
            response,
            error: None,
            strategy: Some(strategy),
            search: Some(search),
            rows: Some(rows),
            evaluation: Some(evaluation),
            from_cache: CacheSource::None,
            refined,
            original_strategy,
            degraded,
        };

        if respond_ok {
            if let Some(strategy) = outcome.strategy.as_ref() {
                self.store_outcome(strategy, &outcome).await;
            }
        }
        outcome
    }

    fn route<'a>(&self, strategy: &'a SearchStrategy) -> CacheRoute<'a> {
        match strategy.semantic_key() {
            Some(key) if self.semantic.is_enabled() => CacheRoute::Semantic(key),
            _ => CacheRoute::Strategy,
        }
    }

    async fn lookup(&self, strategy: &SearchStrategy) -> Option<QueryOutcome> {
        match self.route(strategy) {
            CacheRoute::Semantic(key) => match self.semantic.get(key).await {
                Ok(Some(mut hit)) => {
                    info!(event = "semantic_cache_hit", key);
                    hit.from_cache = CacheSource::Semantic;
                    Some(hit)
                },
                Ok(None) => {
                    info!(event = "semantic_cache_miss", key);
                    None
                },
                Err(e) => {
                    warn!(event = "semantic_cache_miss", key, error = %e, "key normalization failed");
                    None
                },
            },
            CacheRoute::Strategy => match self.strategies.get(strategy).await {
                Ok(Some(mut hit)) => {
                    info!(event = "strategy_cache_hit", kind = %strategy.kind);
                    hit.from_cache = CacheSource::Strategy;
                    Some(hit)
                },
                Ok(None) => {
                    info!(event = "strategy_cache_miss", kind = %strategy.kind);
                    None
                },
                Err(e) => {
                    warn!(event = "strategy_cache_miss", error = %e, "fingerprint lookup failed");
                    None
                },
            },
        }
    }

    async fn store_outcome(&self, strategy: &SearchStrategy, outcome: &QueryOutcome) {
        let stored = match self.route(strategy) {
            CacheRoute::Semantic(key) => self.semantic.set(key, outcome.clone()).await,
            CacheRoute::Strategy => self.strategies.set(strategy, outcome.clone()).await,
        };
        if let Err(e) = stored {
            warn!(error = %e, "could not cache outcome");
        }
    }

    async fn analyze(&self, query: &str, ctx: &PromptContext<'_>) -> Result<SearchStrategy> {
        let request = LlmRequest::new(Purpose::Analyze, prompts::analyze(query, ctx));
        let text = self.llm.complete(&request).await?;
        parse_structured(&text)
    }

    async fn generate_search(&self, strategy: &SearchStrategy, ctx: &PromptContext<'_>) -> Result<SqlQuery> {
        let request = LlmRequest::new(Purpose::GenerateSearch, prompts::generate_search(strategy, ctx));
        let text = self.llm.complete(&request).await?;
        let search: SqlQuery = parse_structured(&text)?;
        if search.sql.trim().is_empty() {
            return Err(Error::Parse("model returned an empty sql_query".into()));
        }
        debug!(sql = %search.sql, params = search.parameters.len(), "generated search");
        Ok(search)
    }

    async fn evaluate(
        &self,
        query: &str,
        strategy: &SearchStrategy,
        rows: &SqlOutcome,
        ctx: &PromptContext<'_>,
    ) -> Result<Evaluation> {
        let request = LlmRequest::new(Purpose::Evaluate, prompts::evaluate(query, strategy, rows, ctx));
        let text = self.llm.complete(&request).await?;
        parse_structured(&text)
    }

    async fn respond(
        &self,
        query: &str,
        strategy: &SearchStrategy,
        rows: &SqlOutcome,
        evaluation: &Evaluation,
        ctx: &PromptContext<'_>,
    ) -> Result<String> {
        let request = LlmRequest::new(
            Purpose::Respond,
            prompts::respond(query, strategy, rows, evaluation, ctx),
        );
        let text = self.llm.complete(&request).await?;
        let cleaned = dedup_consecutive_lines(text.trim());
        if cleaned.trim().is_empty() {
            return Err(Error::Llm("model returned an empty answer".into()));
        }
        Ok(cleaned)
    }

    /// Statistics for both caches.
    pub async fn cache_stats(&self) -> CacheReport {
        CacheReport {
            semantic: self.semantic.stats().await,
            strategy: self.strategies.stats().await,
            semantic_enabled: self.semantic.is_enabled(),
        }
    }

    /// Empty both caches, delete their files and forget normalized keys.
    pub async fn clear_caches(&self) {
        self.semantic.clear().await;
        self.strategies.clear().await;
        self.semantic.keys().normalizer().clear().await;
        info!("caches cleared");
    }

    /// Save both caches now. Returns `true` when every enabled cache was written.
    pub async fn flush(&self) -> bool {
        let semantic_ok = !self.semantic.is_enabled() || self.semantic.flush().await;
        let strategy_ok = self.strategies.flush().await;
        semantic_ok && strategy_ok
    }
}

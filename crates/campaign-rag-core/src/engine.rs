//! The per-query retrieval and answer state machine.
//!
//! ```text
//! RESOLVING → SCOPING → POOLING → RANKING → GENERATING → DONE
//!     │          │                   │           │
//!     └──────────┴─────── REFUSED ───┴───────────┘
//! ```
//!
//! Refusal is an ordinary outcome: [`Engine::answer_query`] returns
//! `Ok(Answer)` carrying the fixed refusal text and no sources. Only
//! collaborator failures (store, embedder, generator) are errors.
//!
//! The engine holds no mutable state. Every collaborator is shared behind
//! an `Arc` and read concurrently by any number of queries.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::catalog::{resources_for, ScopedCatalog};
use crate::context::{build_context, compose_answer, featured_block};
use crate::embedding::{normalize, Embedder};
use crate::generate::{ChatMessage, GenerationError, GenerationOptions, Generator};
use crate::models::{Answer, Keyword, Query, RefusalReason, DEFAULT_RESOURCE_TYPE};
use crate::prompt::{user_prompt, PromptTemplate};
use crate::rank::{rank, RankParams, Ranking};
use crate::resolve::KeywordResolver;
use crate::scope::{descendants, resource_hops, DEFAULT_MAX_DEPTH};
use crate::store::HierarchyStore;
use crate::text::TextPipeline;
use crate::vector::{PoolHit, VectorPool, DEFAULT_POOL_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Scoping,
    Pooling,
    Ranking,
    Generating,
    Done,
    Refused,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Resolving => "resolving",
            Stage::Scoping => "scoping",
            Stage::Pooling => "pooling",
            Stage::Ranking => "ranking",
            Stage::Generating => "generating",
            Stage::Done => "done",
            Stage::Refused => "refused",
        };
        f.write_str(s)
    }
}

/// Tunables for retrieval and generation.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub pool_size: usize,
    pub max_depth: u32,
    pub alpha: f64,
    pub beta: f64,
    /// Type tag eligible for the featured block.
    pub promo_type: String,
    pub featured_limit: usize,
    /// Type tag for resources stored without one.
    pub default_type: String,
    pub generation: GenerationOptions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            alpha: 0.7,
            beta: 0.3,
            promo_type: "shopping".to_string(),
            featured_limit: 3,
            default_type: DEFAULT_RESOURCE_TYPE.to_string(),
            generation: GenerationOptions {
                model: "llama-3.1-8b-instant".to_string(),
                temperature: 0.1,
                max_tokens: 600,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("hierarchy store error: {0:#}")]
    Store(anyhow::Error),

    #[error("embedding error: {0:#}")]
    Embedding(anyhow::Error),
}

/// Everything retrieval produced for a query that was not refused.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub keyword: Keyword,
    pub catalog: ScopedCatalog,
    pub ranking: Ranking,
}

#[derive(Debug, Clone)]
pub enum Retrieval {
    Refused(RefusalReason),
    Ranked(Retrieved),
}

pub struct Engine {
    store: Arc<dyn HierarchyStore>,
    embedder: Arc<dyn Embedder>,
    pool: Arc<VectorPool>,
    generator: Arc<dyn Generator>,
    resolver: KeywordResolver,
    pipeline: TextPipeline,
    prompt: PromptTemplate,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: Arc<dyn HierarchyStore>,
        embedder: Arc<dyn Embedder>,
        pool: Arc<VectorPool>,
        generator: Arc<dyn Generator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            pool,
            generator,
            resolver: KeywordResolver::default(),
            pipeline: TextPipeline::default(),
            prompt: PromptTemplate::default(),
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: KeywordResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_pipeline(mut self, pipeline: TextPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn HierarchyStore> {
        &self.store
    }

    /// Run the full pipeline for one query.
    pub async fn answer_query(&self, query: &Query) -> Result<Answer, EngineError> {
        let retrieved = match self.retrieve(query).await? {
            Retrieval::Refused(reason) => return Ok(Answer::refusal(reason)),
            Retrieval::Ranked(r) => r,
        };
        self.generate(query, &retrieved).await
    }

    /// Resolution, scoping, pooling and ranking, without generation.
    pub async fn retrieve(&self, query: &Query) -> Result<Retrieval, EngineError> {
        debug!(stage = %Stage::Resolving, question = %query.question, "query started");
        let keyword = self
            .resolver
            .resolve(
                self.store.as_ref(),
                query.keyword_id.as_deref(),
                query.keyword_name.as_deref(),
                &query.question,
            )
            .await
            .map_err(EngineError::Store)?;
        let Some(keyword) = keyword else {
            return Ok(Retrieval::Refused(refused(Stage::Resolving, RefusalReason::NoKeyword)));
        };
        if query.excludes_keyword(&keyword.name) {
            return Ok(Retrieval::Refused(refused(Stage::Resolving, RefusalReason::PolicyExcluded)));
        }

        debug!(stage = %Stage::Scoping, keyword_id = %keyword.id, keyword = %keyword.name, "keyword resolved");
        let store = self.store.as_ref();
        let keyword_ids = descendants(store, &keyword.id, self.settings.max_depth)
            .await
            .map_err(EngineError::Store)?;
        let catalog = ScopedCatalog::new(
            resources_for(store, &keyword_ids)
                .await
                .map_err(EngineError::Store)?,
        )
        .with_default_type(&self.settings.default_type);
        if catalog.is_empty() {
            return Ok(Retrieval::Refused(refused(Stage::Scoping, RefusalReason::EmptyScope)));
        }
        let allowed = catalog.allowed_ids(&query.resource_types);
        if allowed.is_empty() {
            return Ok(Retrieval::Refused(refused(Stage::Scoping, RefusalReason::NoTypedResources)));
        }
        let hops = resource_hops(store, &keyword.id, self.settings.max_depth)
            .await
            .map_err(EngineError::Store)?;
        if hops.is_empty() {
            return Ok(Retrieval::Refused(refused(Stage::Scoping, RefusalReason::EmptyScope)));
        }
        debug!(
            keywords = keyword_ids.len(),
            resources = catalog.len(),
            allowed = allowed.len(),
            "scope expanded"
        );

        debug!(stage = %Stage::Pooling, pool_size = self.settings.pool_size, "searching vector pool");
        let pool = self.pool_for(&query.question).await?;

        debug!(stage = %Stage::Ranking, pool = pool.len(), "ranking candidates");
        let params = RankParams {
            alpha: self.settings.alpha,
            beta: self.settings.beta,
            hop_sentinel: self.settings.max_depth,
            top_k: query.top_k,
        };
        let ranking = rank(&pool, &allowed, &hops, &params);
        if ranking.is_empty() {
            return Ok(Retrieval::Refused(refused(Stage::Ranking, RefusalReason::NoCandidates)));
        }
        if ranking.used_fallback {
            debug!(candidates = ranking.primary.len(), "pool missed scope, ranked by graph prior");
        }

        Ok(Retrieval::Ranked(Retrieved {
            keyword,
            catalog,
            ranking,
        }))
    }

    async fn pool_for(&self, question: &str) -> Result<Vec<PoolHit>, EngineError> {
        if self.pool.matrix().is_empty() {
            return Ok(Vec::new());
        }
        let mut qv = self
            .embedder
            .encode(question)
            .await
            .map_err(EngineError::Embedding)?;
        normalize(&mut qv);
        Ok(self.pool.search(&qv, self.settings.pool_size))
    }

    async fn generate(&self, query: &Query, retrieved: &Retrieved) -> Result<Answer, EngineError> {
        let Retrieved {
            keyword,
            catalog,
            ranking,
        } = retrieved;

        debug!(stage = %Stage::Generating, ranked = ranking.primary.len(), "building context");
        let context = build_context(&ranking.primary_ids(), catalog, query.top_k);
        if context.is_empty() {
            return Ok(Answer::refusal(refused(
                Stage::Generating,
                RefusalReason::EmptyContext,
            )));
        }

        let system = self.prompt.render_system(
            &query.enabled.describe(),
            &query.disabled_str(),
            &context.sources,
        );
        let topic = if keyword.name.trim().is_empty() {
            query.question.as_str()
        } else {
            keyword.name.as_str()
        };
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(user_prompt(&context.text, topic)),
        ];

        let raw = match self
            .generator
            .complete(&messages, &self.settings.generation)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(generator = self.generator.name(), error = %e, "generation failed");
                return Err(e.into());
            }
        };
        let body = self.pipeline.run(&raw);

        let featured_ids: Vec<String> = ranking
            .overflow
            .iter()
            .filter(|c| {
                catalog
                    .type_of(&c.id)
                    .is_some_and(|t| t == self.settings.promo_type)
            })
            .take(self.settings.featured_limit)
            .map(|c| c.id.clone())
            .collect();
        let featured = build_context(&featured_ids, catalog, self.settings.featured_limit);
        let featured = featured_block(&featured, self.settings.featured_limit);

        let (text, sources) = compose_answer(&body, &featured, &context.sources);
        debug!(stage = %Stage::Done, sources = sources.len(), "answer composed");
        Ok(Answer {
            text,
            sources,
            refusal: None,
        })
    }
}

fn refused(stage: Stage, reason: RefusalReason) -> RefusalReason {
    info!(stage = %stage, reason = ?reason, next = %Stage::Refused, "query refused");
    reason
}

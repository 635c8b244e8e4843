//! Engine construction and the `ask`, `keywords` and `scope` commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use campaign_rag_core::engine::{Engine, EngineSettings};
use campaign_rag_core::generate::GenerationOptions;
use campaign_rag_core::models::{Query, RefusalReason};
use campaign_rag_core::prompt::PromptTemplate;
use campaign_rag_core::resolve::KeywordResolver;
use campaign_rag_core::scope::{descendants, resource_hops};
use campaign_rag_core::store::HierarchyStore;
use campaign_rag_core::text::TextPipeline;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::index::load_pool;
use crate::llm::create_generator;
use crate::sqlite_store::SqliteHierarchyStore;

/// Wire store, embedder, vector pool and generator into an [`Engine`].
///
/// Every data-integrity problem (missing graph, bad artifacts, missing
/// API key, unreadable prompt) fails here, before any query runs.
pub async fn build_engine(config: &Config) -> Result<Engine> {
    if !config.graph.path.exists() {
        anyhow::bail!(
            "Graph database not found: {}. Run `crag init` and `crag import` first.",
            config.graph.path.display()
        );
    }
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteHierarchyStore::new(pool));

    let embedder = create_embedder(&config.embedding)?;
    let vectors = load_pool(config, embedder.as_ref())?;
    let generator = create_generator(&config.llm)?;

    let prompt = match &config.prompt.system_prompt_path {
        Some(path) => PromptTemplate::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt: {}", path.display()))?,
        ),
        None => PromptTemplate::default(),
    };
    let pipeline = TextPipeline::with_extra_patterns(&config.prompt.strip_patterns)?;
    let resolver = KeywordResolver::new(config.prompt.name_rewrites()?);

    let r = &config.retrieval;
    let settings = EngineSettings {
        pool_size: r.pool_size,
        max_depth: r.max_depth,
        alpha: r.alpha,
        beta: r.beta,
        promo_type: r.promo_type.to_lowercase(),
        featured_limit: r.featured_limit,
        default_type: r.default_type.clone(),
        generation: GenerationOptions {
            model: config.llm.primary_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
    };

    Ok(Engine::new(store, embedder, vectors, generator, settings)
        .with_resolver(resolver)
        .with_prompt(prompt)
        .with_pipeline(pipeline))
}

/// Raw query inputs shared by the CLI and the HTTP endpoint.
#[derive(Debug, Clone, Default)]
pub struct QueryInput {
    pub message: String,
    pub top_k: Option<usize>,
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    pub resource_types: Vec<String>,
    pub keyword_id: Option<String>,
    pub keyword_name: Option<String>,
}

impl QueryInput {
    /// Build a [`Query`], applying configured defaults. An explicit
    /// `top_k` of zero falls back to the default.
    pub fn into_query(self, config: &Config) -> Query {
        let top_k = self
            .top_k
            .filter(|k| *k > 0)
            .unwrap_or(config.retrieval.top_k);
        let mut query = Query::new(self.message)
            .with_enabled(&self.enabled)
            .with_disabled(&self.disabled)
            .with_resource_types(&self.resource_types)
            .with_top_k(top_k);
        if let Some(id) = self.keyword_id.filter(|s| !s.trim().is_empty()) {
            query = query.with_keyword_id(id);
        }
        if let Some(name) = self.keyword_name.filter(|s| !s.trim().is_empty()) {
            query = query.with_keyword_name(name);
        }
        query
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    answer: &'a str,
    sources: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    refusal: Option<RefusalReason>,
}

pub async fn run_ask(config: &Config, input: QueryInput, json: bool) -> Result<()> {
    let engine = build_engine(config).await?;
    let query = input.into_query(config);
    let answer = engine.answer_query(&query).await?;

    if json {
        let out = AskOutput {
            answer: &answer.text,
            sources: &answer.sources,
            refusal: answer.refusal,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    // The composed text already ends with its Sources section.
    println!("{}", answer.text);
    Ok(())
}

pub async fn run_keywords(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteHierarchyStore::new(pool);
    let keywords = store.all_keywords().await?;
    let (_, resources, talents) = store.counts().await?;

    if keywords.is_empty() {
        println!("No keywords. Run `crag import <manifest>` first.");
        return Ok(());
    }
    println!("{:<24} {:<32} PARENT", "ID", "NAME");
    for k in &keywords {
        println!(
            "{:<24} {:<32} {}",
            k.id,
            k.name,
            k.parent.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!(
        "{} keywords, {} resources, {} talents",
        keywords.len(),
        resources,
        talents
    );
    Ok(())
}

/// Print the descendants and hop map for a keyword id or name.
pub async fn run_scope(config: &Config, keyword: &str, max_depth: Option<u32>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteHierarchyStore::new(pool);
    let depth = max_depth.unwrap_or(config.retrieval.max_depth);

    let root = match store.get_keyword(keyword).await? {
        Some(k) => k,
        None => store
            .find_keyword_by_name(keyword)
            .await?
            .with_context(|| format!("No keyword with id or name '{}'", keyword))?,
    };

    let ids = descendants(&store, &root.id, depth).await?;
    let hops = resource_hops(&store, &root.id, depth).await?;
    let resources = store.resources_tagged(&ids).await?;

    println!("Keyword: {} ({})", root.name, root.id);
    println!("Max depth: {}", depth);
    println!();
    println!("Keywords in scope ({}):", ids.len());
    for (kw, d) in store.children_within(&root.id, depth).await? {
        println!("  {}{} ({})", "  ".repeat(d as usize), kw.name, kw.id);
    }
    println!();
    println!("Resources in scope ({}):", resources.len());
    for r in &resources {
        let hop = hops
            .get(&r.id)
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] hops={} {} {}",
            r.type_tag_or(&config.retrieval.default_type),
            hop,
            r.display_title(),
            r.url.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

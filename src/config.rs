use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use campaign_rag_core::resolve::{default_rewrites, NameRewrite};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub graph: GraphConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub dir: PathBuf,
    #[serde(default = "default_index_kind")]
    pub kind: String,
    #[serde(default = "default_n_lists")]
    pub n_lists: usize,
    #[serde(default = "default_n_probe")]
    pub n_probe: usize,
    #[serde(default = "default_index_scope")]
    pub scope: String,
    #[serde(default)]
    pub include_url: bool,
}

fn default_index_kind() -> String {
    "ivf".to_string()
}
fn default_n_lists() -> usize {
    16
}
fn default_n_probe() -> usize {
    4
}
fn default_index_scope() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            primary_model: default_primary_model(),
            fallback_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            retry_attempts: default_retry_attempts(),
            backoff_min_secs: default_backoff_min_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_primary_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    600
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_min_secs() -> u64 {
    2
}
fn default_backoff_max_secs() -> u64 {
    60
}
fn default_llm_timeout_secs() -> u64 {
    45
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_promo_type")]
    pub promo_type: String,
    #[serde(default = "default_featured_limit")]
    pub featured_limit: usize,
    #[serde(default = "default_type")]
    pub default_type: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            pool_size: default_pool_size(),
            max_depth: default_max_depth(),
            alpha: default_alpha(),
            beta: default_beta(),
            promo_type: default_promo_type(),
            featured_limit: default_featured_limit(),
            default_type: default_type(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_pool_size() -> usize {
    1000
}
fn default_max_depth() -> u32 {
    3
}
fn default_alpha() -> f64 {
    0.7
}
fn default_beta() -> f64 {
    0.3
}
fn default_promo_type() -> String {
    "shopping".to_string()
}
fn default_featured_limit() -> usize {
    3
}
fn default_type() -> String {
    "news".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
    #[serde(default)]
    pub rewrites: Option<Vec<RewriteConfig>>,
    #[serde(default)]
    pub strip_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RewriteConfig {
    pub pattern: String,
    pub replacement: String,
}

impl PromptConfig {
    /// Configured rewrites, or the built-in abbreviation rewrite when none are set.
    pub fn name_rewrites(&self) -> Result<Vec<NameRewrite>> {
        match &self.rewrites {
            None => Ok(default_rewrites()),
            Some(list) => list
                .iter()
                .map(|r| NameRewrite::new(&r.pattern, &r.replacement))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.pool_size < config.retrieval.top_k {
        bail!("retrieval.pool_size must be >= retrieval.top_k");
    }
    if config.retrieval.alpha < 0.0 || config.retrieval.beta < 0.0 {
        bail!("retrieval.alpha and retrieval.beta must be >= 0.0");
    }
    if config.retrieval.default_type.trim().is_empty() {
        bail!("retrieval.default_type must not be empty");
    }

    // Validate index
    match config.index.kind.as_str() {
        "ivf" | "flat" => {}
        other => bail!("Unknown index kind: '{}'. Must be ivf or flat.", other),
    }
    if config.index.kind == "ivf" && (config.index.n_lists == 0 || config.index.n_probe == 0) {
        bail!("index.n_lists and index.n_probe must be > 0 for an ivf index");
    }
    match config.index.scope.as_str() {
        "all" | "resources" | "keywords" | "talents" => {}
        other => bail!(
            "Unknown index scope: '{}'. Must be all, resources, keywords, or talents.",
            other
        ),
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider != "hash" && config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "openai" | "demo" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be openai or demo.",
            other
        ),
    }
    if config.llm.retry_attempts == 0 {
        bail!("llm.retry_attempts must be >= 1");
    }
    if config.llm.backoff_min_secs > config.llm.backoff_max_secs {
        bail!("llm.backoff_min_secs must be <= llm.backoff_max_secs");
    }

    // Validate prompt patterns early so a bad regex fails at startup
    config.prompt.name_rewrites()?;
    campaign_rag_core::text::TextPipeline::with_extra_patterns(&config.prompt.strip_patterns)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let text = format!(
            r#"
[graph]
path = "/tmp/graph.sqlite"

[index]
dir = "/tmp/index"
{}
"#,
            extra
        );
        let config: Config = toml::from_str(&text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let c = parse("").unwrap();
        assert_eq!(c.retrieval.top_k, 5);
        assert_eq!(c.retrieval.pool_size, 1000);
        assert_eq!(c.retrieval.max_depth, 3);
        assert_eq!(c.retrieval.promo_type, "shopping");
        assert_eq!(c.llm.api_key_env, "GROQ_API_KEY");
        assert_eq!(c.llm.max_tokens, 600);
        assert_eq!(c.llm.timeout_secs, 45);
        assert_eq!(c.index.kind, "ivf");
        assert_eq!(c.server.bind, "127.0.0.1:8000");
        assert!(!c.embedding.is_enabled());
        assert_eq!(c.prompt.name_rewrites().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse("[embedding]\nprovider = \"bogus\"").is_err());
        assert!(parse("[llm]\nprovider = \"bogus\"").is_err());
        assert!(parse("[index]\nkind = \"hnsw\"").is_err());
    }

    #[test]
    fn test_hash_provider_needs_dims_only() {
        assert!(parse("[embedding]\nprovider = \"hash\"").is_err());
        let c = parse("[embedding]\nprovider = \"hash\"\ndims = 64").unwrap();
        assert_eq!(c.embedding.dims, Some(64));
    }

    #[test]
    fn test_bad_strip_pattern_rejected() {
        assert!(parse("[prompt]\nstrip_patterns = [\"(\"]").is_err());
    }

    #[test]
    fn test_custom_rewrites_replace_default() {
        let c = parse(
            "[prompt]\nrewrites = [{ pattern = '(?i)\\bysl\\b', replacement = \"saint laurent\" }]",
        )
        .unwrap();
        let rewrites = c.prompt.name_rewrites().unwrap();
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].apply("YSL bags"), "saint laurent bags");
    }
}

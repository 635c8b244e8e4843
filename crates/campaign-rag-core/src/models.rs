//! Core data models used throughout Campaign RAG.
//!
//! Keywords and resources are owned by an external graph store and are
//! read-only here. Queries, ranked candidates, and answers are transient
//! and live for the duration of one request.

use serde::{Deserialize, Serialize};

/// Fixed reply returned whenever policy or scope eliminates every candidate.
pub const REFUSAL: &str = "It is not associated with exclusive campaigns.";

/// Type tag assigned to resources that carry none.
pub const DEFAULT_RESOURCE_TYPE: &str = "news";

/// A node in the keyword hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
}

/// A tagged, typed, URL-bearing content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Free-form type tag (`"news"`, `"shopping"`, `"hotel"`, ...).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Keyword ids this resource is tagged with.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Resource {
    /// Title for display, falling back to the resource id.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.id)
    }

    /// Lower-cased type tag, or `default` when the resource has none.
    pub fn type_tag_or(&self, default: &str) -> String {
        normalize_type(Some(&self.resource_type), default)
    }
}

/// Trim and lower-case a raw type tag. Blank or missing tags become
/// `default`, itself trimmed and lower-cased.
pub fn normalize_type(raw: Option<&str>, default: &str) -> String {
    raw.map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default.trim().to_lowercase())
}

/// An allow-list that is either unrestricted or limited to named entries.
///
/// Parsed from user-supplied lists where the single entry `"all"` means
/// no restriction. Entries are compared lower-cased and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Only(Vec<String>),
}

impl Selection {
    /// Build from raw entries. Empty input or `["all"]` yields [`Selection::All`].
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = normalize_list(items);
        if list.is_empty() || list == ["all"] {
            Selection::All
        } else {
            Selection::Only(list)
        }
    }

    pub fn allows(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(items) => {
                let v = value.trim().to_lowercase();
                items.iter().any(|i| *i == v)
            }
        }
    }

    /// Comma-joined rendering for prompts (`"all"` when unrestricted).
    pub fn describe(&self) -> String {
        match self {
            Selection::All => "all".to_string(),
            Selection::Only(items) => items.join(", "),
        }
    }
}

/// Lower-case, trim, and drop empty entries. Comma-separated entries are split.
pub fn normalize_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .flat_map(|s| {
            s.as_ref()
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// A single question against the campaign graph.
#[derive(Debug, Clone)]
pub struct Query {
    pub question: String,
    /// Keyword names allowed to answer (`All` by default).
    pub enabled: Selection,
    /// Keyword names that force a refusal. `"none"` entries are ignored.
    pub disabled: Vec<String>,
    /// Resource type tags allowed into the scope (`All` by default).
    pub resource_types: Selection,
    pub top_k: usize,
    pub keyword_id: Option<String>,
    pub keyword_name: Option<String>,
}

impl Query {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            enabled: Selection::All,
            disabled: Vec::new(),
            resource_types: Selection::All,
            top_k: 5,
            keyword_id: None,
            keyword_name: None,
        }
    }

    pub fn with_enabled<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.enabled = Selection::from_items(items);
        self
    }

    pub fn with_disabled<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.disabled = normalize_list(items)
            .into_iter()
            .filter(|d| d != "none")
            .collect();
        self
    }

    pub fn with_resource_types<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resource_types = Selection::from_items(items);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_keyword_id(mut self, id: impl Into<String>) -> Self {
        self.keyword_id = Some(id.into());
        self
    }

    pub fn with_keyword_name(mut self, name: impl Into<String>) -> Self {
        self.keyword_name = Some(name.into());
        self
    }

    /// Whether the keyword name is blocked by the disabled list or
    /// missing from a restricted enabled list.
    pub fn excludes_keyword(&self, name: &str) -> bool {
        let name_lc = name.trim().to_lowercase();
        self.disabled.iter().any(|d| *d == name_lc) || !self.enabled.allows(&name_lc)
    }

    /// Comma-joined disabled list for prompts (`"none"` when empty).
    pub fn disabled_str(&self) -> String {
        if self.disabled.is_empty() {
            "none".to_string()
        } else {
            self.disabled.join(", ")
        }
    }
}

/// A resource scored for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub id: String,
    /// Cosine similarity against the query (0.0 when ranked without the pool).
    pub vector_score: f64,
    /// Graph distance from the resolved keyword to the nearest tagging keyword.
    pub hops: u32,
    /// Blended score: `alpha * vector_score + beta * 1/(1 + hops)`.
    pub score: f64,
}

/// Why a query ended in the refusal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    NoKeyword,
    PolicyExcluded,
    EmptyScope,
    NoTypedResources,
    NoCandidates,
    EmptyContext,
}

/// The final reply for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Deduplicated canonical source URLs in first-seen order.
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<RefusalReason>,
}

impl Answer {
    pub fn refusal(reason: RefusalReason) -> Self {
        Self {
            text: REFUSAL.to_string(),
            sources: Vec::new(),
            refusal: Some(reason),
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.refusal.is_some()
    }
}

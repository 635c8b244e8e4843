//! # Campaign RAG Core
//!
//! Retrieval logic for campaign-scoped chat: keyword resolution, scope
//! expansion over the keyword hierarchy, vector pool search, hybrid
//! ranking, and answer composition.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP clients.
//! Storage, embedding, and text generation are reached through the
//! [`store::HierarchyStore`], [`embedding::Embedder`], and
//! [`generate::Generator`] traits; the application crate supplies the
//! concrete backends.
//!
//! ```text
//! question ─▶ resolve ─▶ scope ─▶ catalog ─▶ pool ─▶ rank ─▶ context ─▶ generate
//!               │          │         │                  │        │
//!               └──────────┴─────────┴──── refusal ─────┴────────┘
//! ```

pub mod catalog;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod generate;
pub mod models;
pub mod prompt;
pub mod rank;
pub mod resolve;
pub mod scope;
pub mod store;
pub mod text;
pub mod vector;

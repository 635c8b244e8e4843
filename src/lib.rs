//! # Campaign RAG
//!
//! Keyword-scoped retrieval-augmented chat over a campaign graph.
//!
//! A question is resolved to one keyword in a hierarchy. The keyword's
//! depth-bounded subtree defines which resources may be cited. Candidates
//! come from a flat embedding pool intersected with that scope, ranked by
//! a blend of vector similarity and graph distance, and handed to a text
//! generator as context. Anything outside the scope is refused with a
//! fixed sentence.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Manifest   │──▶│ SQLite graph │   │ ids.json +   │
//! │ (crag import)│   │  keywords,   │   │ embeddings   │
//! └──────┬───────┘   │  resources   │   │   .f32       │
//!        │           └──────┬───────┘   └──────┬───────┘
//!        └── crag index build ───────────────▶ │
//!                           ▼                  ▼
//!                    ┌────────────────────────────────┐
//!                    │  Engine (campaign-rag-core)    │
//!                    │  resolve → scope → pool → rank │
//!                    │  → generate                    │
//!                    └──────────────┬─────────────────┘
//!                        ┌──────────┴─────────┐
//!                        ▼                    ▼
//!                  ┌──────────┐         ┌──────────┐
//!                  │   CLI    │         │   HTTP   │
//!                  │  (crag)  │         │ /api/chat│
//!                  └──────────┘         └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Graph schema |
//! | [`manifest`] | Manifest import and tag propagation |
//! | [`sqlite_store`] | SQLite hierarchy store |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | Vector artifact build and load |
//! | [`llm`] | Text generation clients with retry and fallback |
//! | [`chat`] | Engine wiring and CLI query commands |
//! | [`server`] | HTTP chat endpoint |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod manifest;
pub mod migrate;
pub mod server;
pub mod sqlite_store;

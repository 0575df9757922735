//! # Lineal
//!
//! **Lineage tree reconstruction over event stores.**
//!
//! Given one or more seed node identifiers, a time range, and a schema
//! describing how lineage is encoded in the underlying records, Lineal
//! issues a bounded sequence of queries against a document index and
//! assembles the ancestors and descendants into a single tree — handling
//! both lineage encodings, deduplication, depth/size limits, and partial
//! store failures.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │   CLI    │──▶│  fetch engine │──▶│ QueryExecutor │──▶ Elasticsearch
//! │  (HTTP)  │   │ (lineal-core) │   │  (_search)    │
//! └──────────┘   └───────────────┘   └───────────────┘
//! ```
//!
//! The engine lives in `lineal-core` and is a pure function of its options
//! and the executor; this crate supplies the Elasticsearch-backed executor,
//! the TOML configuration layer, the JSON tree API, and the `lineal` CLI.
//!
//! ## Lineage encodings
//!
//! | Encoding | Fetch strategy |
//! |----------|----------------|
//! | Ancestry array | Single-shot: every record embeds its full ancestor chain |
//! | Parent edge | Breadth-first: one query per level, frontier-driven |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`es`] | Elasticsearch-compatible `QueryExecutor` with retry/backoff |
//! | [`server`] | JSON tree API (Axum) with CORS |
//! | [`fetch_cmd`] | `lineal fetch` command: flags → options → printed tree |
//! | [`schemas`] | `lineal schemas` command: list configured schemas |

pub mod config;
pub mod es;
pub mod fetch_cmd;
pub mod schemas;
pub mod server;

pub use lineal_core::executor::{QueryExecutor, QueryPage};
pub use lineal_core::fetch::fetch_tree;
pub use lineal_core::models::{LineageTree, TreeOptions};

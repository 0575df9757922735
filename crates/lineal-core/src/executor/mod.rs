//! Query execution abstraction.
//!
//! The [`QueryExecutor`] trait is the seam between the fetch engine and the
//! document store: one operation, `execute`, taking a bounded
//! [`QueryDescriptor`] and returning a page of raw records plus a
//! "more available" indicator. Retries, authentication, and transport
//! mechanics belong to implementations, not to the engine.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! in-memory implementation returns immediately-ready futures.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::QueryError;
use crate::query::QueryDescriptor;

/// One page of raw records from the store.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Raw documents in the store's natural return order.
    pub records: Vec<Value>,
    /// More records matched than `size` allowed to be returned.
    pub has_more: bool,
}

/// Executes bounded queries against a document store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, descriptor: &QueryDescriptor) -> Result<QueryPage, QueryError>;
}

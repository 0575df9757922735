//! Error taxonomy for the fetch pipeline.
//!
//! Hitting a limit is not an error: truncation is a first-class result
//! flag ([`DirectionStatus::truncated`]) and a fetch
//! prefers a partial, clearly-flagged tree over total failure whenever a
//! subset of the tree was retrieved.
//!
//! [`DirectionStatus::truncated`]: crate::models::DirectionStatus

use thiserror::Error;

use crate::models::NodeId;

/// A record did not conform to the declared lineage schema.
///
/// Mismatching records are skipped and counted; they never abort a fetch.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("schema mismatch on field `{field}`: {reason}")]
pub struct SchemaMismatch {
    /// The field that was absent or malformed.
    pub field: String,
    /// What was wrong with it.
    pub reason: String,
}

impl SchemaMismatch {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by the query-execution collaborator.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The store answered with an error status.
    #[error("store API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The store could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The store answered, but not in the expected shape.
    #[error("malformed store response: {0}")]
    MalformedResponse(String),

    /// Anything else an executor implementation needs to surface.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fatal fetch failures.
///
/// Store failures after partial progress are recorded on the affected
/// direction's status instead; these variants are the cases where nothing
/// useful could be returned.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Caller error, rejected before any query is issued.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The store failed before any node was collected.
    #[error("query execution failed")]
    QueryExecution(#[source] QueryError),

    /// A record declares itself as its own parent — a data-quality problem
    /// in the source store, not a fetch bug.
    #[error("inconsistent tree: node `{0}` declares itself as its own parent")]
    InconsistentTree(NodeId),
}

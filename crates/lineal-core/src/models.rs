//! Core data models used throughout Lineal.
//!
//! These types represent the options, nodes, and trees that flow through the
//! fetch pipeline. Everything here is constructed fresh per fetch request
//! and immutable once the fetch completes; there is no cross-request state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::LineageSchema;

/// Opaque identifier of a single event/process record.
///
/// Equality is exact string match; no normalization is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open `[start, end)` window restricting which records a fetch sees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Depth and size bounds for one traversal direction.
///
/// A depth or limit of 0 disables expansion in that direction entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionOptions {
    /// Maximum number of lineage hops to traverse.
    pub depth: usize,
    /// Maximum total node count returned for this direction.
    pub limit: usize,
}

/// All inputs for a single tree fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeOptions {
    /// Seed node identifiers the tree is grown from.
    pub seeds: Vec<NodeId>,
    /// How lineage is encoded in the underlying records.
    pub schema: LineageSchema,
    /// Only records inside this window participate in the tree.
    pub timerange: TimeRange,
    /// Index patterns the queries run against.
    pub index_patterns: Vec<String>,
    /// Bounds for ancestor expansion.
    #[serde(default)]
    pub ancestors: DirectionOptions,
    /// Bounds for descendant expansion.
    #[serde(default)]
    pub descendants: DirectionOptions,
}

/// A single node in the assembled tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: NodeId,
    /// The raw record the node was resolved from. `None` only for seed
    /// nodes that no executed query returned.
    pub record: Option<serde_json::Value>,
    /// First-seen parent reference, if the record declared one.
    pub parent: Option<NodeId>,
}

/// Outcome flags for one traversal direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectionStatus {
    /// More candidates existed than `limit` allowed to be returned.
    pub truncated: bool,
    /// Records skipped because they did not conform to the schema.
    pub skipped: usize,
    /// Store-side failure that aborted this direction's expansion.
    pub error: Option<String>,
}

/// The assembled lineage tree.
///
/// Every node whose declared parent is absent from `nodes` is listed in
/// `dangling` — a truncated tree is flagged, never silently pruned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageTree {
    /// Every fetched node, keyed by its identifier.
    pub nodes: BTreeMap<NodeId, TreeNode>,
    /// The seed identifiers the fetch started from.
    pub seeds: Vec<NodeId>,
    /// Nodes whose declared parent is absent from `nodes`.
    pub dangling: Vec<NodeId>,
    pub ancestors: DirectionStatus,
    pub descendants: DirectionStatus,
}

/// Cooperative cancellation flag checked between expansion levels.
///
/// Cancelling aborts further expansion; nodes collected before the flag was
/// observed are still returned.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

//! Tree fetcher: drives iterative expansion against a [`QueryExecutor`].
//!
//! The fetch is a pure function of its options and the executor — no
//! caches, no shared state — so it is testable against the in-memory
//! executor alone. Expansion is modeled as an explicit frontier set rather
//! than recursion, keeping depth/limit bookkeeping centralized and making
//! cancellation observable between levels.
//!
//! # Algorithm
//!
//! 1. Validate options; reject with `InvalidOptions` before any query.
//! 2. Ancestor direction: look up the seed records (their parent references
//!    seed the first hop), then walk parent references level by level (edge
//!    schemas) or fetch the depth-truncated ancestry arrays in one shot
//!    (array schemas).
//! 3. Descendant direction: match the lineage field against the frontier,
//!    level by level for edge schemas, single-shot for array schemas.
//! 4. Assemble: merge seeds, ancestors, and descendants, list dangling
//!    parents, reject self-parenting records.
//!
//! Within one direction, levels are strictly sequential for edge schemas —
//! each level's query depends on the previous level's discovered IDs. A
//! store failure after partial progress aborts only the affected direction;
//! nodes collected from earlier levels are still returned, with
//! `truncated = true` and the failure recorded on that direction's status.

use std::collections::{HashMap, HashSet};

use crate::assemble::assemble;
use crate::error::{FetchError, QueryError};
use crate::executor::QueryExecutor;
use crate::models::{CancelFlag, LineageTree, NodeId, TreeNode, TreeOptions};
use crate::query::{descendants_query, lookup_query};
use crate::schema::{Lineage, LineageSchema};

/// Nodes and flags collected for one traversal direction.
#[derive(Debug, Default)]
pub(crate) struct DirectionOutcome {
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) truncated: bool,
    pub(crate) skipped: usize,
    pub(crate) error: Option<QueryError>,
}

/// Fetch the lineage tree described by `options`.
///
/// Fails only for invalid options, a store failure before any node was
/// collected, or a self-parenting record during assembly. All other
/// conditions — limits, depth cutoffs, per-record schema mismatches, store
/// failures after partial progress — surface as flags on the returned tree.
pub async fn fetch_tree<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    cancel: &CancelFlag,
) -> Result<LineageTree, FetchError> {
    validate(options)?;

    let mut seed_nodes: HashMap<NodeId, TreeNode> = options
        .seeds
        .iter()
        .map(|id| {
            (
                id.clone(),
                TreeNode {
                    id: id.clone(),
                    record: None,
                    parent: None,
                },
            )
        })
        .collect();

    let mut ancestors = fetch_ancestors(executor, options, cancel, &mut seed_nodes).await;
    let mut descendants = fetch_descendants(executor, options, cancel).await;

    let nothing_collected = ancestors.nodes.is_empty()
        && descendants.nodes.is_empty()
        && seed_nodes.values().all(|node| node.record.is_none());
    if nothing_collected {
        if let Some(err) = ancestors.error.take().or_else(|| descendants.error.take()) {
            return Err(FetchError::QueryExecution(err));
        }
    }

    assemble(&options.seeds, seed_nodes, ancestors, descendants)
}

fn validate(options: &TreeOptions) -> Result<(), FetchError> {
    if options.seeds.is_empty() {
        return Err(FetchError::InvalidOptions(
            "seed set must not be empty".into(),
        ));
    }
    if options.index_patterns.is_empty() {
        return Err(FetchError::InvalidOptions(
            "at least one index pattern is required".into(),
        ));
    }
    if options.timerange.start > options.timerange.end {
        return Err(FetchError::InvalidOptions(
            "timerange start must not be after end".into(),
        ));
    }
    Ok(())
}

/// Expand toward the root.
///
/// Both encodings start from a seed lookup: the seeds' own records carry
/// the parent references the first hop needs. Seed records are attached to
/// the seed nodes and do not count against `ancestors.limit`.
async fn fetch_ancestors<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    cancel: &CancelFlag,
    seed_nodes: &mut HashMap<NodeId, TreeNode>,
) -> DirectionOutcome {
    let mut out = DirectionOutcome::default();
    let bounds = options.ancestors;
    if bounds.depth == 0 || bounds.limit == 0 || cancel.is_cancelled() {
        return out;
    }

    let descriptor = lookup_query(
        &options.schema,
        &options.seeds,
        &options.index_patterns,
        options.timerange,
        options.seeds.len(),
    );
    let page = match executor.execute(&descriptor).await {
        Ok(page) => page,
        Err(err) => {
            out.error = Some(err);
            return out;
        }
    };

    // Parents referenced by the seed records (edge) or depth-truncated
    // ancestry candidates, nearest first per seed (array).
    let mut frontier: Vec<NodeId> = Vec::new();
    let mut candidates: Vec<NodeId> = Vec::new();
    for record in &page.records {
        let resolved = match options.schema.resolve(record) {
            Ok(resolved) => resolved,
            Err(_) => {
                out.skipped += 1;
                continue;
            }
        };
        let Some(node) = seed_nodes.get_mut(&resolved.id) else {
            // Not one of our seeds; stores may return overlapping pages.
            continue;
        };
        node.record = Some(record.clone());
        node.parent = resolved.parent().cloned();
        match resolved.lineage {
            Lineage::Parent(Some(parent)) => frontier.push(parent),
            Lineage::Parent(None) => {}
            Lineage::Ancestors(ancestry) => {
                candidates.extend(ancestry.into_iter().take(bounds.depth));
            }
        }
    }

    match &options.schema {
        LineageSchema::EdgeBased(_) => {
            expand_ancestor_edges(executor, options, cancel, frontier, &mut out).await;
        }
        LineageSchema::Ancestry(_) => {
            fetch_ancestry_candidates(executor, options, cancel, candidates, &mut out).await;
        }
    }
    out
}

/// Level-by-level parent walk for edge schemas. Each level fetches the
/// records referenced as parents by the previous level.
async fn expand_ancestor_edges<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    cancel: &CancelFlag,
    initial: Vec<NodeId>,
    out: &mut DirectionOutcome,
) {
    let bounds = options.ancestors;
    let mut visited: HashSet<NodeId> = options.seeds.iter().cloned().collect();
    let mut frontier: Vec<NodeId> = Vec::new();
    for id in initial {
        if !visited.contains(&id) && !frontier.contains(&id) {
            frontier.push(id);
        }
    }

    let mut level = 0;
    while !frontier.is_empty() && level < bounds.depth && out.nodes.len() < bounds.limit {
        if cancel.is_cancelled() {
            return;
        }
        let remaining = bounds.limit - out.nodes.len();
        let descriptor = lookup_query(
            &options.schema,
            &frontier,
            &options.index_patterns,
            options.timerange,
            remaining,
        );
        let page = match executor.execute(&descriptor).await {
            Ok(page) => page,
            Err(err) => {
                out.truncated = true;
                out.error = Some(err);
                return;
            }
        };

        let mut next: Vec<NodeId> = Vec::new();
        let mut overflowed = page.has_more;
        for record in &page.records {
            let resolved = match options.schema.resolve(record) {
                Ok(resolved) => resolved,
                Err(_) => {
                    out.skipped += 1;
                    continue;
                }
            };
            if visited.contains(&resolved.id) {
                continue;
            }
            if out.nodes.len() >= bounds.limit {
                overflowed = true;
                break;
            }
            let parent = resolved.parent().cloned();
            if let Some(parent) = &parent {
                if !visited.contains(parent) && !next.contains(parent) {
                    next.push(parent.clone());
                }
            }
            visited.insert(resolved.id.clone());
            out.nodes.push(TreeNode {
                id: resolved.id,
                record: Some(record.clone()),
                parent,
            });
        }
        if overflowed {
            out.truncated = true;
        }
        frontier = next;
        level += 1;
    }
    if out.nodes.len() >= bounds.limit && !frontier.is_empty() {
        out.truncated = true;
    }
}

/// Single-shot ancestor retrieval for array schemas: the candidate IDs were
/// already cut to `depth` per seed, so one lookup fetches the whole chain.
async fn fetch_ancestry_candidates<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    cancel: &CancelFlag,
    candidates: Vec<NodeId>,
    out: &mut DirectionOutcome,
) {
    let bounds = options.ancestors;
    let seed_set: HashSet<&NodeId> = options.seeds.iter().collect();

    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut wanted: Vec<NodeId> = Vec::new();
    for id in candidates {
        if seed_set.contains(&id) || seen.contains(&id) {
            continue;
        }
        seen.insert(id.clone());
        wanted.push(id);
    }
    if wanted.len() > bounds.limit {
        wanted.truncate(bounds.limit);
        out.truncated = true;
    }
    if wanted.is_empty() || cancel.is_cancelled() {
        return;
    }

    let descriptor = lookup_query(
        &options.schema,
        &wanted,
        &options.index_patterns,
        options.timerange,
        wanted.len(),
    );
    let page = match executor.execute(&descriptor).await {
        Ok(page) => page,
        Err(err) => {
            out.truncated = true;
            out.error = Some(err);
            return;
        }
    };

    let wanted_set: HashSet<NodeId> = wanted.into_iter().collect();
    let mut collected: HashSet<NodeId> = HashSet::new();
    for record in &page.records {
        let resolved = match options.schema.resolve(record) {
            Ok(resolved) => resolved,
            Err(_) => {
                out.skipped += 1;
                continue;
            }
        };
        if !wanted_set.contains(&resolved.id) || collected.contains(&resolved.id) {
            continue;
        }
        let parent = resolved.parent().cloned();
        collected.insert(resolved.id.clone());
        out.nodes.push(TreeNode {
            id: resolved.id,
            record: Some(record.clone()),
            parent,
        });
    }
}

/// Expand away from the root.
async fn fetch_descendants<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    cancel: &CancelFlag,
) -> DirectionOutcome {
    let mut out = DirectionOutcome::default();
    let bounds = options.descendants;
    if bounds.depth == 0 || bounds.limit == 0 || cancel.is_cancelled() {
        return out;
    }

    match &options.schema {
        LineageSchema::EdgeBased(_) => {
            expand_descendant_edges(executor, options, cancel, &mut out).await;
        }
        LineageSchema::Ancestry(_) => {
            fetch_descendants_by_ancestry(executor, options, &mut out).await;
        }
    }
    out
}

/// True breadth-first expansion for edge schemas: one query per level, each
/// level's discovered IDs feeding the next level's frontier.
async fn expand_descendant_edges<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    cancel: &CancelFlag,
    out: &mut DirectionOutcome,
) {
    let bounds = options.descendants;
    let mut visited: HashSet<NodeId> = options.seeds.iter().cloned().collect();
    let mut frontier: Vec<NodeId> = options.seeds.clone();
    let mut level = 0;

    while !frontier.is_empty() && level < bounds.depth && out.nodes.len() < bounds.limit {
        if cancel.is_cancelled() {
            return;
        }
        let remaining = bounds.limit - out.nodes.len();
        let descriptor = descendants_query(
            &options.schema,
            &frontier,
            &options.index_patterns,
            options.timerange,
            remaining,
        );
        let page = match executor.execute(&descriptor).await {
            Ok(page) => page,
            Err(err) => {
                out.truncated = true;
                out.error = Some(err);
                return;
            }
        };

        let mut next: Vec<NodeId> = Vec::new();
        let mut overflowed = page.has_more;
        for record in &page.records {
            let resolved = match options.schema.resolve(record) {
                Ok(resolved) => resolved,
                Err(_) => {
                    out.skipped += 1;
                    continue;
                }
            };
            if visited.contains(&resolved.id) {
                continue;
            }
            if out.nodes.len() >= bounds.limit {
                overflowed = true;
                break;
            }
            let parent = resolved.parent().cloned();
            visited.insert(resolved.id.clone());
            next.push(resolved.id.clone());
            out.nodes.push(TreeNode {
                id: resolved.id,
                record: Some(record.clone()),
                parent,
            });
        }
        if overflowed {
            out.truncated = true;
        }
        frontier = next;
        level += 1;
    }
    if out.nodes.len() >= bounds.limit && !frontier.is_empty() {
        out.truncated = true;
    }
}

/// Single-shot descendant retrieval for array schemas.
///
/// One query matches every record whose ancestry array contains a seed.
/// Depth is enforced client-side: a record is within `depth` hops iff a
/// seed appears among the first `depth` entries of its ancestry array.
async fn fetch_descendants_by_ancestry<E: QueryExecutor + ?Sized>(
    executor: &E,
    options: &TreeOptions,
    out: &mut DirectionOutcome,
) {
    let bounds = options.descendants;
    let descriptor = descendants_query(
        &options.schema,
        &options.seeds,
        &options.index_patterns,
        options.timerange,
        bounds.limit,
    );
    let page = match executor.execute(&descriptor).await {
        Ok(page) => page,
        Err(err) => {
            out.truncated = true;
            out.error = Some(err);
            return;
        }
    };

    let seed_set: HashSet<&NodeId> = options.seeds.iter().collect();
    let mut visited: HashSet<NodeId> = options.seeds.iter().cloned().collect();
    let mut overflowed = page.has_more;
    for record in &page.records {
        let resolved = match options.schema.resolve(record) {
            Ok(resolved) => resolved,
            Err(_) => {
                out.skipped += 1;
                continue;
            }
        };
        let Lineage::Ancestors(ancestry) = &resolved.lineage else {
            out.skipped += 1;
            continue;
        };
        if !ancestry
            .iter()
            .take(bounds.depth)
            .any(|ancestor| seed_set.contains(ancestor))
        {
            continue;
        }
        if visited.contains(&resolved.id) {
            continue;
        }
        if out.nodes.len() >= bounds.limit {
            overflowed = true;
            break;
        }
        let parent = ancestry.first().cloned();
        visited.insert(resolved.id.clone());
        out.nodes.push(TreeNode {
            id: resolved.id,
            record: Some(record.clone()),
            parent,
        });
    }
    if overflowed {
        out.truncated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::memory::InMemoryExecutor;
    use crate::executor::QueryPage;
    use crate::models::{DirectionOptions, TimeRange};
    use crate::query::QueryDescriptor;
    use crate::schema::{AncestrySchema, EdgeSchema};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn edge_schema() -> LineageSchema {
        LineageSchema::EdgeBased(EdgeSchema {
            id_field: "id".into(),
            parent_field: "parent".into(),
            timestamp_field: "@timestamp".into(),
            filter: None,
        })
    }

    fn ancestry_schema() -> LineageSchema {
        LineageSchema::Ancestry(AncestrySchema {
            id_field: "id".into(),
            ancestry_field: "ancestry".into(),
            timestamp_field: "@timestamp".into(),
            filter: None,
        })
    }

    fn timerange() -> TimeRange {
        TimeRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    fn options(schema: LineageSchema, seeds: &[&str]) -> TreeOptions {
        TreeOptions {
            seeds: seeds.iter().map(|s| NodeId::from(*s)).collect(),
            schema,
            timerange: timerange(),
            index_patterns: vec!["events-*".to_string()],
            ancestors: DirectionOptions { depth: 0, limit: 0 },
            descendants: DirectionOptions { depth: 0, limit: 0 },
        }
    }

    fn edge_record(id: &str, parent: Option<&str>) -> Value {
        match parent {
            Some(parent) => json!({"id": id, "parent": parent, "@timestamp": "2024-01-10T00:00:00Z"}),
            None => json!({"id": id, "@timestamp": "2024-01-10T00:00:00Z"}),
        }
    }

    fn ancestry_record(id: &str, ancestry: &[&str]) -> Value {
        json!({"id": id, "ancestry": ancestry, "@timestamp": "2024-01-10T00:00:00Z"})
    }

    async fn fetch(executor: &InMemoryExecutor, options: &TreeOptions) -> LineageTree {
        fetch_tree(executor, options, &CancelFlag::new())
            .await
            .unwrap()
    }

    fn ids(tree: &LineageTree) -> Vec<&str> {
        tree.nodes.keys().map(|id| id.as_str()).collect()
    }

    fn parent_of<'a>(tree: &'a LineageTree, id: &str) -> Option<&'a str> {
        tree.nodes[&NodeId::from(id)]
            .parent
            .as_ref()
            .map(|p| p.as_str())
    }

    #[tokio::test]
    async fn empty_seed_set_is_rejected() {
        let executor = InMemoryExecutor::new(vec![]);
        let opts = options(edge_schema(), &[]);
        let err = fetch_tree(&executor, &opts, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn inverted_timerange_is_rejected() {
        let executor = InMemoryExecutor::new(vec![]);
        let mut opts = options(edge_schema(), &["n1"]);
        std::mem::swap(&mut opts.timerange.start, &mut opts.timerange.end);
        let err = fetch_tree(&executor, &opts, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn zero_depth_returns_exactly_the_seeds() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("n1", None),
            edge_record("n2", Some("n1")),
        ]);
        let opts = options(edge_schema(), &["n1"]);
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["n1"]);
        assert!(tree.nodes[&NodeId::from("n1")].record.is_none());
        assert!(!tree.ancestors.truncated);
        assert!(!tree.descendants.truncated);
    }

    #[tokio::test]
    async fn edge_chain_descendants_with_depth_two() {
        // A <- B <- C
        let executor = InMemoryExecutor::new(vec![
            edge_record("a", None),
            edge_record("b", Some("a")),
            edge_record("c", Some("b")),
        ]);
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["a", "b", "c"]);
        assert_eq!(parent_of(&tree, "b"), Some("a"));
        assert_eq!(parent_of(&tree, "c"), Some("b"));
        assert!(!tree.descendants.truncated);
    }

    #[tokio::test]
    async fn edge_descendants_stop_at_depth() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("a", None),
            edge_record("b", Some("a")),
            edge_record("c", Some("b")),
            edge_record("d", Some("c")),
        ]);
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn concrete_two_level_fan_out() {
        // seeds ["n1"], records {n2->n1}, {n3->n1}, {n4->n2}
        let executor = InMemoryExecutor::new(vec![
            edge_record("n2", Some("n1")),
            edge_record("n3", Some("n1")),
            edge_record("n4", Some("n2")),
        ]);
        let mut opts = options(edge_schema(), &["n1"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["n1", "n2", "n3", "n4"]);
        assert_eq!(parent_of(&tree, "n4"), Some("n2"));
        assert!(!tree.descendants.truncated);
    }

    #[tokio::test]
    async fn edge_ancestors_walk_parent_references() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("root", None),
            edge_record("mid", Some("root")),
            edge_record("leaf", Some("mid")),
        ]);
        let mut opts = options(edge_schema(), &["leaf"]);
        opts.ancestors = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["leaf", "mid", "root"]);
        assert_eq!(parent_of(&tree, "leaf"), Some("mid"));
        assert_eq!(parent_of(&tree, "mid"), Some("root"));
        assert_eq!(parent_of(&tree, "root"), None);
        assert!(tree.dangling.is_empty());
        // the seed's record was attached by the seed lookup
        assert!(tree.nodes[&NodeId::from("leaf")].record.is_some());
    }

    #[tokio::test]
    async fn edge_ancestors_stop_at_depth_and_flag_dangling() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("root", None),
            edge_record("g2", Some("root")),
            edge_record("g1", Some("g2")),
            edge_record("leaf", Some("g1")),
        ]);
        let mut opts = options(edge_schema(), &["leaf"]);
        opts.ancestors = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["g1", "g2", "leaf"]);
        // g2's parent (root) was beyond depth; flagged, not dropped
        assert_eq!(tree.dangling, vec![NodeId::from("g2")]);
    }

    #[tokio::test]
    async fn ancestry_array_truncated_to_depth() {
        // seed's ancestry [p1, p2, p3], depth 2 -> p1, p2 only
        let executor = InMemoryExecutor::new(vec![
            ancestry_record("s", &["p1", "p2", "p3"]),
            ancestry_record("p1", &["p2", "p3"]),
            ancestry_record("p2", &["p3"]),
            ancestry_record("p3", &[]),
        ]);
        let mut opts = options(ancestry_schema(), &["s"]);
        opts.ancestors = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["p1", "p2", "s"]);
        assert_eq!(parent_of(&tree, "s"), Some("p1"));
        assert_eq!(parent_of(&tree, "p1"), Some("p2"));
        // p2 still names p3 as its parent; p3 is beyond depth
        assert_eq!(tree.dangling, vec![NodeId::from("p2")]);
        assert!(!tree.ancestors.truncated);
    }

    #[tokio::test]
    async fn ancestry_descendants_single_shot_with_depth() {
        let executor = InMemoryExecutor::new(vec![
            ancestry_record("b", &["a"]),
            ancestry_record("c", &["b", "a"]),
            ancestry_record("d", &["c", "b", "a"]),
        ]);
        let mut opts = options(ancestry_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        // d is three hops away: "a" is not among the first two ancestry entries
        assert_eq!(ids(&tree), vec!["a", "b", "c"]);
        assert_eq!(parent_of(&tree, "b"), Some("a"));
        assert_eq!(parent_of(&tree, "c"), Some("b"));
    }

    #[tokio::test]
    async fn ancestry_descendant_with_out_of_tree_parent_is_dangling() {
        // c's direct parent x was never part of the fetch
        let executor = InMemoryExecutor::new(vec![ancestry_record("c", &["x", "a"])]);
        let mut opts = options(ancestry_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["a", "c"]);
        assert_eq!(parent_of(&tree, "c"), Some("x"));
        assert_eq!(tree.dangling, vec![NodeId::from("c")]);
    }

    #[tokio::test]
    async fn duplicate_records_keep_first_seen_parent() {
        // two records claim id "x" with different parents; both seeds are
        // frontier members, so both records match the level query
        let executor = InMemoryExecutor::new(vec![
            edge_record("x", Some("n1")),
            edge_record("x", Some("n3")),
        ]);
        let mut opts = options(edge_schema(), &["n1", "n3"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["n1", "n3", "x"]);
        assert_eq!(parent_of(&tree, "x"), Some("n1"));
    }

    #[tokio::test]
    async fn limit_truncates_and_flags() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("b", Some("a")),
            edge_record("c", Some("a")),
            edge_record("d", Some("a")),
        ]);
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions { depth: 5, limit: 2 };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(tree.nodes.len(), 3); // seed + 2 descendants
        assert!(tree.descendants.truncated);
    }

    #[tokio::test]
    async fn ancestry_candidate_limit_truncates_and_flags() {
        let executor = InMemoryExecutor::new(vec![
            ancestry_record("s", &["p1", "p2", "p3"]),
            ancestry_record("p1", &["p2", "p3"]),
            ancestry_record("p2", &["p3"]),
        ]);
        let mut opts = options(ancestry_schema(), &["s"]);
        opts.ancestors = DirectionOptions { depth: 3, limit: 1 };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["p1", "s"]);
        assert!(tree.ancestors.truncated);
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_and_counted() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("b", Some("a")),
            json!({"parent": "a", "@timestamp": "2024-01-10T00:00:00Z"}),
        ]);
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["a", "b"]);
        assert_eq!(tree.descendants.skipped, 1);
    }

    #[tokio::test]
    async fn self_parenting_record_fails_assembly() {
        let executor = InMemoryExecutor::new(vec![edge_record("s", Some("s"))]);
        let mut opts = options(edge_schema(), &["s"]);
        opts.ancestors = DirectionOptions {
            depth: 1,
            limit: 10,
        };
        let err = fetch_tree(&executor, &opts, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InconsistentTree(id) if id == NodeId::from("s")));
    }

    #[tokio::test]
    async fn fetch_is_idempotent() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("n2", Some("n1")),
            edge_record("n3", Some("n1")),
            edge_record("n4", Some("n2")),
        ]);
        let mut opts = options(edge_schema(), &["n1"]);
        opts.descendants = DirectionOptions {
            depth: 3,
            limit: 10,
        };
        let first = fetch(&executor, &opts).await;
        let second = fetch(&executor, &opts).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn pre_cancelled_fetch_returns_only_seeds() {
        let executor = InMemoryExecutor::new(vec![edge_record("b", Some("a"))]);
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 3,
            limit: 10,
        };
        let cancel = CancelFlag::new();
        cancel.cancel();
        let tree = fetch_tree(&executor, &opts, &cancel).await.unwrap();
        assert_eq!(ids(&tree), vec!["a"]);
        assert!(tree.descendants.error.is_none());
    }

    /// Cancels the shared flag after each query, so expansion stops at the
    /// next level boundary.
    struct CancelAfterFirst {
        inner: InMemoryExecutor,
        flag: CancelFlag,
    }

    #[async_trait]
    impl QueryExecutor for CancelAfterFirst {
        async fn execute(&self, descriptor: &QueryDescriptor) -> Result<QueryPage, QueryError> {
            let page = self.inner.execute(descriptor).await;
            self.flag.cancel();
            page
        }
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_levels() {
        let flag = CancelFlag::new();
        let executor = CancelAfterFirst {
            inner: InMemoryExecutor::new(vec![
                edge_record("b", Some("a")),
                edge_record("c", Some("b")),
            ]),
            flag: flag.clone(),
        };
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 5,
            limit: 10,
        };
        let tree = fetch_tree(&executor, &opts, &flag).await.unwrap();
        // level one completed before the flag was observed; level two never ran
        assert_eq!(ids(&tree), vec!["a", "b"]);
    }

    /// Fails every call past `fail_after`, counting from zero.
    struct FailingExecutor {
        inner: InMemoryExecutor,
        fail_after: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for FailingExecutor {
        async fn execute(&self, descriptor: &QueryDescriptor) -> Result<QueryPage, QueryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_after {
                return Err(QueryError::Api {
                    status: 503,
                    message: "shard failure".into(),
                });
            }
            self.inner.execute(descriptor).await
        }
    }

    #[tokio::test]
    async fn store_failure_with_no_progress_fails_the_fetch() {
        let executor = FailingExecutor {
            inner: InMemoryExecutor::new(vec![]),
            fail_after: 0,
            calls: AtomicUsize::new(0),
        };
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 2,
            limit: 10,
        };
        let err = fetch_tree(&executor, &opts, &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::QueryExecution(_)));
    }

    #[tokio::test]
    async fn store_failure_after_progress_returns_partial_tree() {
        let executor = FailingExecutor {
            inner: InMemoryExecutor::new(vec![
                edge_record("b", Some("a")),
                edge_record("c", Some("b")),
            ]),
            fail_after: 1,
            calls: AtomicUsize::new(0),
        };
        let mut opts = options(edge_schema(), &["a"]);
        opts.descendants = DirectionOptions {
            depth: 5,
            limit: 10,
        };
        let tree = fetch_tree(&executor, &opts, &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(ids(&tree), vec!["a", "b"]);
        assert!(tree.descendants.truncated);
        let message = tree.descendants.error.as_deref().unwrap();
        assert!(message.contains("503"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn both_directions_combine_into_one_tree() {
        let executor = InMemoryExecutor::new(vec![
            edge_record("root", None),
            edge_record("mid", Some("root")),
            edge_record("seed", Some("mid")),
            edge_record("child", Some("seed")),
        ]);
        let mut opts = options(edge_schema(), &["seed"]);
        opts.ancestors = DirectionOptions {
            depth: 5,
            limit: 10,
        };
        opts.descendants = DirectionOptions {
            depth: 5,
            limit: 10,
        };
        let tree = fetch(&executor, &opts).await;
        assert_eq!(ids(&tree), vec!["child", "mid", "root", "seed"]);
        assert_eq!(parent_of(&tree, "seed"), Some("mid"));
        assert_eq!(parent_of(&tree, "child"), Some("seed"));
        assert!(tree.dangling.is_empty());
    }
}

//! Result assembly: flat node sets into a consistent tree.
//!
//! Dangling parent references are legitimate — depth and limit cut trees
//! mid-chain — so they are listed on the result, never dropped. A record
//! declaring itself as its own parent is a data-quality problem in the
//! source store and aborts assembly.

use std::collections::{BTreeMap, HashMap};

use crate::error::FetchError;
use crate::fetch::DirectionOutcome;
use crate::models::{DirectionStatus, LineageTree, NodeId, TreeNode};

/// Merge seed, ancestor, and descendant node sets into the final tree.
///
/// A node discovered by more than one direction is recorded once; the
/// first-seen entry wins (seeds, then ancestors, then descendants).
pub(crate) fn assemble(
    seeds: &[NodeId],
    seed_nodes: HashMap<NodeId, TreeNode>,
    ancestors: DirectionOutcome,
    descendants: DirectionOutcome,
) -> Result<LineageTree, FetchError> {
    let mut nodes: BTreeMap<NodeId, TreeNode> = BTreeMap::new();
    let merged = seed_nodes
        .into_values()
        .chain(ancestors.nodes.iter().cloned())
        .chain(descendants.nodes.iter().cloned());
    for node in merged {
        if node.parent.as_ref() == Some(&node.id) {
            return Err(FetchError::InconsistentTree(node.id));
        }
        nodes.entry(node.id.clone()).or_insert(node);
    }

    let dangling: Vec<NodeId> = nodes
        .values()
        .filter(|node| {
            node.parent
                .as_ref()
                .is_some_and(|parent| !nodes.contains_key(parent))
        })
        .map(|node| node.id.clone())
        .collect();

    Ok(LineageTree {
        nodes,
        seeds: seeds.to_vec(),
        dangling,
        ancestors: status_of(ancestors),
        descendants: status_of(descendants),
    })
}

fn status_of(outcome: DirectionOutcome) -> DirectionStatus {
    DirectionStatus {
        truncated: outcome.truncated,
        skipped: outcome.skipped,
        error: outcome.error.map(|err| err.to_string()),
    }
}

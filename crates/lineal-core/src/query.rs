//! Query descriptor construction.
//!
//! Descriptors are backend-agnostic: index patterns, field filters, a
//! time-range filter, and a size cap. The executor translates them into its
//! store's own query language; the store never needs to support graph
//! traversal.
//!
//! The two schema kinds demand different strategies. Edge-based lineage
//! needs one query per level — a record only references its direct parent,
//! so descendant expansion matches the parent field against the current
//! frontier and feeds each level's results into the next. Ancestry arrays
//! denormalize the full lineage into each record, so a single query
//! matching the ancestry field against the seed set retrieves every
//! descendant at once.
//!
//! Builders always attach the schema's time-range field, its optional
//! pre-filter, and request one record more than the caller's limit so
//! truncation is detectable.

use serde::Serialize;

use crate::models::{NodeId, TimeRange};
use crate::schema::LineageSchema;

/// A field filter clause within a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldFilter {
    /// Field value (or any element, for array fields) equals one of `values`.
    Terms { field: String, values: Vec<String> },
    /// Field value equals `value`.
    Term { field: String, value: String },
}

/// Time-range restriction on a timestamp field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeFilter {
    pub field: String,
    pub range: TimeRange,
}

/// A bounded query against the document store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub index_patterns: Vec<String>,
    pub filters: Vec<FieldFilter>,
    pub timerange: TimeFilter,
    /// Result size cap: the caller's limit plus one probe record.
    pub size: usize,
}

/// Query matching records that reference any frontier ID through the
/// lineage encoding: the parent-edge field for edge schemas, the ancestry
/// array for array schemas.
pub fn descendants_query(
    schema: &LineageSchema,
    frontier: &[NodeId],
    index_patterns: &[String],
    timerange: TimeRange,
    limit: usize,
) -> QueryDescriptor {
    let field = match schema {
        LineageSchema::Ancestry(s) => s.ancestry_field.clone(),
        LineageSchema::EdgeBased(s) => s.parent_field.clone(),
    };
    bounded(
        schema,
        FieldFilter::Terms {
            field,
            values: to_values(frontier),
        },
        index_patterns,
        timerange,
        limit,
    )
}

/// Query fetching records by their own identifier.
///
/// Ancestor expansion uses this to retrieve the seed records and, level by
/// level, the parents they reference.
pub fn lookup_query(
    schema: &LineageSchema,
    ids: &[NodeId],
    index_patterns: &[String],
    timerange: TimeRange,
    limit: usize,
) -> QueryDescriptor {
    bounded(
        schema,
        FieldFilter::Terms {
            field: schema.id_field().to_string(),
            values: to_values(ids),
        },
        index_patterns,
        timerange,
        limit,
    )
}

fn bounded(
    schema: &LineageSchema,
    primary: FieldFilter,
    index_patterns: &[String],
    timerange: TimeRange,
    limit: usize,
) -> QueryDescriptor {
    let mut filters = vec![primary];
    if let Some(pre) = schema.filter() {
        filters.push(FieldFilter::Term {
            field: pre.field.clone(),
            value: pre.value.clone(),
        });
    }
    QueryDescriptor {
        index_patterns: index_patterns.to_vec(),
        filters,
        timerange: TimeFilter {
            field: schema.timestamp_field().to_string(),
            range: timerange,
        },
        size: limit.saturating_add(1),
    }
}

fn to_values(ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|id| id.0.clone()).collect()
}

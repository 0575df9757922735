//! Lineage schemas and node identity resolution.
//!
//! A schema describes, per index/document type, which field holds a record's
//! own identifier and how its lineage is encoded. The two encodings are
//! incompatible at query time, so the variant decides the whole fetch
//! strategy: ancestry arrays denormalize the full lineage into each record
//! and allow single-shot retrieval, edge references only name the direct
//! parent and require level-by-level expansion.
//!
//! Field names are dotted paths (`process.parent.entity_id`) resolved
//! against nested JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaMismatch;
use crate::models::NodeId;

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

/// Constant-value pre-filter attached to every query built from a schema.
///
/// Typically narrows an index to the record category that carries lineage
/// (e.g. `event.category = "process"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValueFilter {
    pub field: String,
    pub value: String,
}

/// Ancestry-array encoding: each record embeds an ordered list of its
/// ancestor IDs, nearest ancestor first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestrySchema {
    /// Field holding the record's own identifier.
    pub id_field: String,
    /// Field holding the ordered ancestor ID array.
    pub ancestry_field: String,
    /// Field the time-range filter applies to.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Optional constant pre-filter attached to every query.
    #[serde(default)]
    pub filter: Option<FieldValueFilter>,
}

/// Edge encoding: each record references its direct parent's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSchema {
    /// Field holding the record's own identifier.
    pub id_field: String,
    /// Field referencing the parent record's identifier.
    pub parent_field: String,
    /// Field the time-range filter applies to.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Optional constant pre-filter attached to every query.
    #[serde(default)]
    pub filter: Option<FieldValueFilter>,
}

/// How lineage is encoded in the underlying records.
///
/// Exactly one encoding applies per schema instance; a record universe
/// never mixes the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineageSchema {
    Ancestry(AncestrySchema),
    EdgeBased(EdgeSchema),
}

/// A record's lineage references, shaped by the schema kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Lineage {
    /// Ordered ancestor IDs, nearest first, from an ancestry array.
    Ancestors(Vec<NodeId>),
    /// Parent reference from an edge field; `None` for a root.
    Parent(Option<NodeId>),
}

/// A record's resolved identity and lineage references.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    pub id: NodeId,
    pub lineage: Lineage,
}

impl ResolvedNode {
    /// Nearest parent reference regardless of encoding.
    pub fn parent(&self) -> Option<&NodeId> {
        match &self.lineage {
            Lineage::Ancestors(ancestors) => ancestors.first(),
            Lineage::Parent(parent) => parent.as_ref(),
        }
    }
}

impl LineageSchema {
    pub fn id_field(&self) -> &str {
        match self {
            LineageSchema::Ancestry(s) => &s.id_field,
            LineageSchema::EdgeBased(s) => &s.id_field,
        }
    }

    pub fn timestamp_field(&self) -> &str {
        match self {
            LineageSchema::Ancestry(s) => &s.timestamp_field,
            LineageSchema::EdgeBased(s) => &s.timestamp_field,
        }
    }

    pub fn filter(&self) -> Option<&FieldValueFilter> {
        match self {
            LineageSchema::Ancestry(s) => s.filter.as_ref(),
            LineageSchema::EdgeBased(s) => s.filter.as_ref(),
        }
    }

    /// Resolve a raw record's identity and lineage references.
    ///
    /// Fails with [`SchemaMismatch`] if the id field is absent or not a
    /// string, or if the ancestry field is absent, not an array, or holds a
    /// non-string entry. An absent parent field on an edge schema means the
    /// record is a root.
    pub fn resolve(&self, record: &Value) -> Result<ResolvedNode, SchemaMismatch> {
        let id = require_string(record, self.id_field())?;

        let lineage = match self {
            LineageSchema::Ancestry(s) => {
                let value = lookup(record, &s.ancestry_field).ok_or_else(|| {
                    SchemaMismatch::new(&s.ancestry_field, "ancestry field is absent")
                })?;
                let entries = value.as_array().ok_or_else(|| {
                    SchemaMismatch::new(&s.ancestry_field, "ancestry field is not an array")
                })?;
                let mut ancestors = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry.as_str() {
                        Some(ancestor) => ancestors.push(NodeId::from(ancestor)),
                        None => {
                            return Err(SchemaMismatch::new(
                                &s.ancestry_field,
                                "ancestry entry is not a string",
                            ))
                        }
                    }
                }
                Lineage::Ancestors(ancestors)
            }
            LineageSchema::EdgeBased(s) => {
                let parent = match lookup(record, &s.parent_field) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(parent)) => Some(NodeId::from(parent.as_str())),
                    Some(_) => {
                        return Err(SchemaMismatch::new(
                            &s.parent_field,
                            "parent field is not a string",
                        ))
                    }
                };
                Lineage::Parent(parent)
            }
        };

        Ok(ResolvedNode { id, lineage })
    }
}

/// Look up a dotted field path (`process.parent.entity_id`) in a record.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn require_string(record: &Value, field: &str) -> Result<NodeId, SchemaMismatch> {
    match lookup(record, field) {
        Some(Value::String(s)) => Ok(NodeId::from(s.as_str())),
        Some(_) => Err(SchemaMismatch::new(field, "field is not a string")),
        None => Err(SchemaMismatch::new(field, "field is absent")),
    }
}

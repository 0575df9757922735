//! In-memory [`QueryExecutor`] for tests.
//!
//! Evaluates descriptors against a fixed record set. Matching is minimal:
//! terms filters compare string fields exactly and
//! array fields element-wise, the time filter parses RFC 3339 timestamps.
//! Records are returned in insertion order, which stands in for the store's
//! natural return order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{QueryExecutor, QueryPage};
use crate::error::QueryError;
use crate::query::{FieldFilter, QueryDescriptor};
use crate::schema::lookup;

/// Fixed-record executor for tests and examples.
#[derive(Debug, Default)]
pub struct InMemoryExecutor {
    records: Vec<Value>,
}

impl InMemoryExecutor {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

fn filter_matches(record: &Value, filter: &FieldFilter) -> bool {
    match filter {
        FieldFilter::Terms { field, values } => match lookup(record, field) {
            Some(Value::String(s)) => values.iter().any(|v| v == s),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .any(|s| values.iter().any(|v| v == s)),
            _ => false,
        },
        FieldFilter::Term { field, value } => {
            matches!(lookup(record, field), Some(Value::String(s)) if s == value)
        }
    }
}

fn in_timerange(record: &Value, descriptor: &QueryDescriptor) -> bool {
    let ts = match lookup(record, &descriptor.timerange.field).and_then(Value::as_str) {
        Some(ts) => ts,
        None => return false,
    };
    match DateTime::parse_from_rfc3339(ts) {
        Ok(parsed) => descriptor
            .timerange
            .range
            .contains(parsed.with_timezone(&Utc)),
        Err(_) => false,
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor) -> Result<QueryPage, QueryError> {
        let mut records: Vec<Value> = self
            .records
            .iter()
            .filter(|record| {
                descriptor
                    .filters
                    .iter()
                    .all(|filter| filter_matches(record, filter))
                    && in_timerange(record, descriptor)
            })
            .cloned()
            .collect();
        let has_more = records.len() > descriptor.size;
        records.truncate(descriptor.size);
        Ok(QueryPage { records, has_more })
    }
}

//! Elasticsearch-compatible query executor.
//!
//! Translates a [`QueryDescriptor`] into a `_search` request body — a
//! `bool` filter over terms clauses plus the time range — and parses the
//! response hits back into a [`QueryPage`]. The store's own ranking is left
//! alone apart from an ascending sort on the timestamp field.
//!
//! # Retry Strategy
//!
//! Transient failures retry with exponential backoff (1s, 2s, 4s, ...,
//! capped at 2^5):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};

use lineal_core::error::QueryError;
use lineal_core::executor::{QueryExecutor, QueryPage};
use lineal_core::query::{FieldFilter, QueryDescriptor};

use crate::config::StoreConfig;

/// Query executor backed by an Elasticsearch-compatible `_search` API.
pub struct EsExecutor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl EsExecutor {
    /// Build an executor from store configuration.
    ///
    /// If `api_key_env` names an environment variable and it is set, its
    /// value is sent as an `Authorization: ApiKey ...` header.
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok());
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    fn search_url(&self, descriptor: &QueryDescriptor) -> String {
        format!(
            "{}/{}/_search",
            self.base_url,
            descriptor.index_patterns.join(",")
        )
    }
}

/// Build the `_search` request body for a descriptor.
fn query_body(descriptor: &QueryDescriptor) -> Value {
    let mut filter: Vec<Value> = descriptor
        .filters
        .iter()
        .map(|clause| match clause {
            FieldFilter::Terms { field, values } => json!({"terms": {field.clone(): values}}),
            FieldFilter::Term { field, value } => json!({"term": {field.clone(): value}}),
        })
        .collect();
    let timerange = &descriptor.timerange;
    filter.push(json!({
        "range": {
            timerange.field.clone(): {
                "gte": timerange.range.start.to_rfc3339_opts(SecondsFormat::Millis, true),
                "lt": timerange.range.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            }
        }
    }));
    json!({
        "query": {"bool": {"filter": filter}},
        "sort": [{timerange.field.clone(): "asc"}],
        "size": descriptor.size,
        "track_total_hits": true,
    })
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: u64,
    #[serde(default)]
    relation: Option<String>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Value,
}

/// Extract records and the "more available" indicator from a `_search`
/// response.
fn parse_page(payload: Value) -> Result<QueryPage, QueryError> {
    let response: SearchResponse = serde_json::from_value(payload)
        .map_err(|err| QueryError::MalformedResponse(err.to_string()))?;
    let returned = response.hits.hits.len();
    let has_more = match &response.hits.total {
        Some(total) => {
            total.value as usize > returned || total.relation.as_deref() == Some("gte")
        }
        None => false,
    };
    let records = response.hits.hits.into_iter().map(|hit| hit.source).collect();
    Ok(QueryPage { records, has_more })
}

#[async_trait]
impl QueryExecutor for EsExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor) -> Result<QueryPage, QueryError> {
        let url = self.search_url(descriptor);
        let body = query_body(descriptor);
        let mut last_err: Option<QueryError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(api_key) = &self.api_key {
                request = request.header("Authorization", format!("ApiKey {}", api_key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response
                            .json()
                            .await
                            .map_err(|err| QueryError::MalformedResponse(err.to_string()))?;
                        return parse_page(payload);
                    }
                    let message = response.text().await.unwrap_or_default();
                    let err = QueryError::Api {
                        status: status.as_u16(),
                        message,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, status = status.as_u16(), "store request failed, retrying");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "store unreachable, retrying");
                    last_err = Some(QueryError::Network(err.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| QueryError::Network("retries exhausted".into())))
    }
}

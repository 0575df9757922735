//! The `lineal fetch` CLI command.
//!
//! Builds [`TreeOptions`] from command-line flags and the configuration
//! defaults, runs the fetch against the configured store, and prints either
//! a summary view or pretty JSON. Ctrl-C cancels between expansion levels,
//! printing whatever was collected.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use lineal_core::fetch::fetch_tree;
use lineal_core::models::{
    CancelFlag, DirectionOptions, DirectionStatus, LineageTree, NodeId, TimeRange, TreeOptions,
};

use crate::config::Config;
use crate::es::EsExecutor;

/// Flag values collected by the CLI.
#[derive(Debug)]
pub struct FetchParams {
    pub seeds: Vec<String>,
    pub schema_name: String,
    pub start: String,
    pub end: String,
    pub index_patterns: Vec<String>,
    pub ancestor_depth: Option<usize>,
    pub ancestor_limit: Option<usize>,
    pub descendant_depth: Option<usize>,
    pub descendant_limit: Option<usize>,
    pub json: bool,
}

pub async fn run_fetch(config: &Config, params: FetchParams) -> Result<()> {
    let Some(schema) = config.schemas.get(&params.schema_name).cloned() else {
        bail!(
            "no schema named `{}` in config; run `lineal schemas` to list them",
            params.schema_name
        );
    };

    let index_patterns = if params.index_patterns.is_empty() {
        config.fetch.index_patterns.clone()
    } else {
        params.index_patterns
    };
    if index_patterns.is_empty() {
        bail!("no index patterns given; set fetch.index_patterns or pass --index");
    }

    let defaults = &config.fetch;
    let options = TreeOptions {
        seeds: params.seeds.iter().map(|s| NodeId::from(s.as_str())).collect(),
        schema,
        timerange: TimeRange {
            start: parse_time(&params.start)?,
            end: parse_time(&params.end)?,
        },
        index_patterns,
        ancestors: DirectionOptions {
            depth: params.ancestor_depth.unwrap_or(defaults.ancestor_depth),
            limit: params.ancestor_limit.unwrap_or(defaults.ancestor_limit),
        },
        descendants: DirectionOptions {
            depth: params.descendant_depth.unwrap_or(defaults.descendant_depth),
            limit: params.descendant_limit.unwrap_or(defaults.descendant_limit),
        },
    };

    let executor = EsExecutor::new(&config.store)?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("cancellation requested, finishing current level");
                cancel.cancel();
            }
        });
    }

    let tree = fetch_tree(&executor, &options, &cancel).await?;

    if params.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree(&tree);
    }
    Ok(())
}

/// Parse a time argument: RFC 3339, or a bare `YYYY-MM-DD` date meaning
/// midnight UTC.
fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("unrecognized time `{}` (expected RFC 3339 or YYYY-MM-DD)", value))?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

fn print_tree(tree: &LineageTree) {
    println!("--- Lineage tree ({} nodes) ---", tree.nodes.len());
    println!("seeds:       {}", join_ids(&tree.seeds));
    if !tree.dangling.is_empty() {
        println!("dangling:    {}", join_ids(&tree.dangling));
    }
    print_direction("ancestors", &tree.ancestors);
    print_direction("descendants", &tree.descendants);
    println!();

    for node in tree.nodes.values() {
        match &node.parent {
            Some(parent) => println!("{}  parent={}", node.id, parent),
            None => println!("{}  (root)", node.id),
        }
    }
}

fn print_direction(label: &str, status: &DirectionStatus) {
    let mut line = format!(
        "{}: truncated={} skipped={}",
        label, status.truncated, status.skipped
    );
    if let Some(error) = &status.error {
        line.push_str(&format!(" error={}", error));
    }
    println!("{}", line);
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

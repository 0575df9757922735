//! The `lineal schemas` command: list configured lineage schemas.

use anyhow::Result;

use lineal_core::schema::LineageSchema;

use crate::config::Config;

pub fn run_schemas(config: &Config) -> Result<()> {
    if config.schemas.is_empty() {
        println!("No schemas configured. Add a [schemas.<name>] section to the config file.");
        return Ok(());
    }

    for (name, schema) in &config.schemas {
        match schema {
            LineageSchema::Ancestry(s) => {
                println!(
                    "{:<16} ancestry    id={} ancestry={} ts={}",
                    name, s.id_field, s.ancestry_field, s.timestamp_field
                );
            }
            LineageSchema::EdgeBased(s) => {
                println!(
                    "{:<16} edge_based  id={} parent={} ts={}",
                    name, s.id_field, s.parent_field, s.timestamp_field
                );
            }
        }
    }
    Ok(())
}

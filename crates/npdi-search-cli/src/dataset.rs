//! Search dataset loading

use anyhow::Context;
use npdi_search_core::Error;
use npdi_search_core::domain::search::SearchRecord;
use std::fs;
use std::path::Path;

/// Records used when no dataset file is given
const SAMPLE: &str = include_str!("../data/sample.json");

/// Load records from a JSON array file, or the built-in sample
pub fn load(path: Option<&Path>) -> anyhow::Result<Vec<SearchRecord>> {
    match path {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .map_err(Error::from)
                .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
            parse(&contents)
                .with_context(|| format!("Failed to parse dataset: {}", path.display()))
        }
        None => parse(SAMPLE).context("Built-in sample dataset is invalid"),
    }
}

fn parse(contents: &str) -> npdi_search_core::Result<Vec<SearchRecord>> {
    let records: Vec<SearchRecord> = serde_json::from_str(contents)?;
    Ok(records)
}

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// One row of the NUFORC index table, as written to `data.json` by the scraper.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Report {
    #[serde(rename = "Date", default, deserialize_with = "null_as_empty")]
    pub date: String,
    #[serde(rename = "City", default, deserialize_with = "null_as_empty")]
    pub city: String,
    #[serde(rename = "State", default, deserialize_with = "null_as_empty")]
    pub state: String,
    #[serde(rename = "Shape", default, deserialize_with = "null_as_empty")]
    pub shape: String,
    #[serde(rename = "Duration", default, deserialize_with = "null_as_empty")]
    pub duration: String,
    #[serde(rename = "Summary", default, deserialize_with = "null_as_empty")]
    pub summary: String,
    #[serde(rename = "Posted", default, deserialize_with = "null_as_empty")]
    pub posted: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub link: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

pub fn parse_reports(text: &str) -> Result<Vec<Report>> {
    let reports: Vec<Report> = serde_json::from_str(text)?;
    Ok(reports)
}

pub fn load_reports(path: &Path) -> Result<Vec<Report>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_reports(&text).with_context(|| format!("Failed to parse {:?}", path))
}

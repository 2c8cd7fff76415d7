//! Row loading from JSON files
//!
//! Cost rows are read from files matched by a glob pattern:
//!
//! - `.json` files hold an array of row objects
//! - `.jsonl` files hold one row object per line; blank lines are ignored and malformed
//!   lines are skipped with a warning
//!
//! JSON numbers become decimals, strings text, arrays lists of strings and `null` a null
//! value. Booleans and nested objects are kept as their JSON text.

use crate::models::{Row, Value};
use anyhow::{bail, Context, Result};
use glob::glob;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Counters collected while loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: usize,
    pub rows: usize,
    pub skipped_lines: usize,
}

pub struct RowSource {}

impl Default for RowSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RowSource {
    pub fn new() -> Self {
        Self {}
    }

    /// Files matched by `pattern`, sorted by path.
    pub fn find_files(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in glob(pattern).with_context(|| format!("Invalid row file pattern: {}", pattern))? {
            let path = entry.context("Failed to read matched path")?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            bail!("No row files match {}", pattern);
        }
        Ok(files)
    }

    /// Load every row from the files matched by `pattern`.
    pub fn load(&self, pattern: &str) -> Result<(Vec<Row>, LoadSummary)> {
        let mut rows = Vec::new();
        let mut summary = LoadSummary::default();

        for path in self.find_files(pattern)? {
            let skipped = self.load_file(&path, &mut rows)?;
            summary.files += 1;
            summary.skipped_lines += skipped;
        }
        summary.rows = rows.len();

        info!(
            pattern,
            files = summary.files,
            rows = summary.rows,
            skipped_lines = summary.skipped_lines,
            "Loaded report rows"
        );
        Ok((rows, summary))
    }

    /// Append the rows of one file to `rows`, returning the number of skipped lines.
    pub fn load_file(&self, path: &Path, rows: &mut Vec<Row>) -> Result<usize> {
        let is_jsonl = path.extension().and_then(|e| e.to_str()) == Some("jsonl");
        if is_jsonl {
            self.load_jsonl(path, rows)
        } else {
            self.load_json(path, rows).map(|_| 0)
        }
    }

    fn load_json(&self, path: &Path, rows: &mut Vec<Row>) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read row file: {}", path.display()))?;
        let objects: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&content)
                .with_context(|| format!("Expected an array of row objects in {}", path.display()))?;

        debug!(path = %path.display(), rows = objects.len(), "Parsed JSON row file");
        rows.extend(objects.into_iter().map(row_from_json));
        Ok(())
    }

    fn load_jsonl(&self, path: &Path, rows: &mut Vec<Row>) -> Result<usize> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open row file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut skipped = 0;

        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(line) {
                Ok(object) => rows.push(row_from_json(object)),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed row"
                    );
                }
            }
        }
        Ok(skipped)
    }
}

pub fn row_from_json(object: serde_json::Map<String, serde_json::Value>) -> Row {
    object
        .into_iter()
        .map(|(name, value)| (name, value_from_json(value)))
        .collect()
}

pub fn value_from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(Value::Decimal)
                .unwrap_or(Value::Text(text))
        }
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ),
        other => Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_value_conversion() {
        assert_eq!(value_from_json(json!(null)), Value::Null);
        assert_eq!(value_from_json(json!(12.5)), Value::from(dec!(12.5)));
        assert_eq!(value_from_json(json!(1e-3)), Value::from(dec!(0.001)));
        assert_eq!(value_from_json(json!("EUR")), Value::from("EUR"));
        assert_eq!(
            value_from_json(json!(["c1", "c2"])),
            Value::List(vec!["c1".to_string(), "c2".to_string()])
        );
        assert_eq!(value_from_json(json!(true)), Value::from("true"));
    }

    #[test]
    fn test_load_json_and_jsonl() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"[{"usage_start": "2022-06-01", "cost_total": 1}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.jsonl"),
            "{\"usage_start\": \"2022-06-02\", \"cost_total\": 2}\n\nnot json\n{\"usage_start\": \"2022-06-03\"}\n",
        )
        .unwrap();

        let pattern = format!("{}/*.json*", dir.path().display());
        let (rows, summary) = RowSource::new().load(&pattern).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            summary,
            LoadSummary {
                files: 2,
                rows: 3,
                skipped_lines: 1
            }
        );
        assert_eq!(rows[0]["cost_total"], Value::from(dec!(1)));
    }

    #[test]
    fn test_unmatched_pattern_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.jsonl", dir.path().display());
        assert!(RowSource::new().load(&pattern).is_err());
    }

    #[test]
    fn test_malformed_json_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), "{not an array").unwrap();
        let pattern = format!("{}/*.json", dir.path().display());
        assert!(RowSource::new().load(&pattern).is_err());
    }
}

//! Pattern catalog loading
//!
//! A catalog is an ordered list of error mappings: one pattern and one
//! interpretation per row. Sources are tabular files identified by
//! extension. Rows are compiled into matchers as they are loaded and the
//! catalog never changes afterwards.

use calamine::{Data, Reader, Xls, Xlsx};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt::Display;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::error::TriageError;
use crate::matcher::{CompiledPattern, MatchOptions};

/// Built-in "Checkpoint" error mappings
const DEFAULT_CATALOG_YAML: &str = include_str!("../patterns/checkpoint.yaml");

/// Label reported for the built-in catalog
pub const DEFAULT_CATALOG_NAME: &str = "checkpoint.yaml";

/// A single error mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    /// Literal text or regular expression
    pub pattern: String,

    /// Diagnostic text returned on match
    pub interpretation: String,

    /// Position among accepted rows (0-based)
    pub ordinal: usize,
}

/// Tabular formats a catalog can be read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Csv,
    Tsv,
    Yaml,
    Json,
    Xlsx,
    Xls,
}

impl CatalogFormat {
    /// Pick a format from a file name's extension
    pub fn from_name(name: &str) -> Result<Self, TriageError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(CatalogFormat::Csv),
            "tsv" => Ok(CatalogFormat::Tsv),
            "yaml" | "yml" => Ok(CatalogFormat::Yaml),
            "json" => Ok(CatalogFormat::Json),
            "xlsx" => Ok(CatalogFormat::Xlsx),
            "xls" => Ok(CatalogFormat::Xls),
            "" => Err(TriageError::CatalogLoad(format!(
                "Cannot determine catalog format of '{}'",
                name
            ))),
            other => Err(TriageError::CatalogLoad(format!(
                "Unsupported catalog format '{}'",
                other
            ))),
        }
    }
}

/// Raw catalog content as supplied by the caller
#[derive(Debug, Clone)]
pub struct CatalogSource {
    /// File name, used for format detection and reporting
    pub name: String,
    pub bytes: Vec<u8>,
}

impl CatalogSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a catalog file from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TriageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            TriageError::CatalogLoad(format!("Failed to read '{}': {}", path.display(), e))
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self { name, bytes })
    }
}

/// A row that was dropped during loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based data row, header excluded
    pub row: usize,
    pub reason: String,
}

/// Outcome of a catalog load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub accepted: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Cells of one row before validation
struct RawRow {
    pattern: Option<String>,
    interpretation: Option<String>,
}

/// Immutable, ordered, compiled catalog
pub struct PatternCatalog {
    name: String,
    patterns: Vec<CompiledPattern>,
    options: MatchOptions,
    report: LoadReport,
}

impl PatternCatalog {
    /// Parse and compile a catalog from raw content
    pub fn load(source: &CatalogSource, options: MatchOptions) -> Result<Self, TriageError> {
        let format = CatalogFormat::from_name(&source.name)?;

        let rows = match format {
            CatalogFormat::Csv => parse_delimited(&source.bytes, b',')?,
            CatalogFormat::Tsv => parse_delimited(&source.bytes, b'\t')?,
            CatalogFormat::Yaml => {
                let doc: Value = serde_yaml::from_slice(&source.bytes).map_err(|e| {
                    TriageError::CatalogLoad(format!("Failed to parse YAML: {}", e))
                })?;
                parse_document(doc)?
            }
            CatalogFormat::Json => {
                let doc: Value = serde_json::from_slice(&source.bytes).map_err(|e| {
                    TriageError::CatalogLoad(format!("Failed to parse JSON: {}", e))
                })?;
                parse_document(doc)?
            }
            CatalogFormat::Xlsx => parse_workbook::<Xlsx<_>>(&source.bytes)?,
            CatalogFormat::Xls => parse_workbook::<Xls<_>>(&source.bytes)?,
        };

        let catalog = Self::from_rows(&source.name, rows, options)?;

        tracing::info!(
            "Loaded {} error mappings from '{}' ({} rows skipped)",
            catalog.len(),
            source.name,
            catalog.report.skipped.len()
        );

        Ok(catalog)
    }

    /// Load the built-in "Checkpoint" catalog
    pub fn builtin(options: MatchOptions) -> Result<Self, TriageError> {
        Self::load(
            &CatalogSource::new(DEFAULT_CATALOG_NAME, DEFAULT_CATALOG_YAML),
            options,
        )
    }

    /// Build a catalog from already-validated entries
    ///
    /// Entries are ordered by `ordinal` (ties keep their input order) and
    /// renumbered densely, so `get(n)` is the n-th entry tried.
    pub fn from_entries(mut entries: Vec<PatternEntry>, options: MatchOptions) -> Self {
        entries.sort_by_key(|entry| entry.ordinal);
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.ordinal = index;
        }

        let accepted = entries.len();
        Self {
            name: "inline".to_string(),
            patterns: entries
                .into_iter()
                .map(|entry| CompiledPattern::compile(entry, options))
                .collect(),
            options,
            report: LoadReport {
                accepted,
                skipped: Vec::new(),
            },
        }
    }

    fn from_rows(
        name: &str,
        rows: Vec<RawRow>,
        options: MatchOptions,
    ) -> Result<Self, TriageError> {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let row_number = index + 1;
            let pattern = row.pattern.as_deref().map(str::trim).unwrap_or_default();

            if pattern.is_empty() || pattern.eq_ignore_ascii_case("nan") {
                tracing::warn!("Skipping catalog row {} in '{}': missing pattern", row_number, name);
                skipped.push(SkippedRow {
                    row: row_number,
                    reason: "missing pattern".to_string(),
                });
                continue;
            }

            let interpretation = row
                .interpretation
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();

            entries.push(PatternEntry {
                pattern: pattern.to_string(),
                interpretation: interpretation.to_string(),
                ordinal: entries.len(),
            });
        }

        if entries.is_empty() {
            return Err(TriageError::CatalogLoad(format!(
                "No valid error mappings found in '{}'",
                name
            )));
        }

        let mut catalog = Self::from_entries(entries, options);
        catalog.name = name.to_string();
        catalog.report.skipped = skipped;
        Ok(catalog)
    }

    /// Compiled patterns in ordinal order
    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Get the entry at a given ordinal
    pub fn get(&self, ordinal: usize) -> Option<&PatternEntry> {
        self.patterns.get(ordinal).map(|p| &p.entry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Read CSV/TSV rows, first record is a header and only the first two
/// columns are used
fn parse_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<RawRow>, TriageError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    // Force header parsing so an unreadable header fails the load.
    reader.byte_headers()?;

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        match record {
            Ok(record) => {
                let cell = |i: usize| {
                    record
                        .get(i)
                        .map(|c| String::from_utf8_lossy(c).into_owned())
                };
                rows.push(RawRow {
                    pattern: cell(0),
                    interpretation: cell(1),
                });
            }
            Err(e) => {
                tracing::warn!("Unreadable catalog record: {}", e);
                rows.push(RawRow {
                    pattern: None,
                    interpretation: None,
                });
            }
        }
    }

    Ok(rows)
}

/// Read the first worksheet, first row is a header and only the first two
/// columns are used
fn parse_workbook<'a, W>(bytes: &'a [u8]) -> Result<Vec<RawRow>, TriageError>
where
    W: Reader<Cursor<&'a [u8]>>,
    W::Error: Display,
{
    let mut workbook = W::new(Cursor::new(bytes))
        .map_err(|e| TriageError::CatalogLoad(format!("Failed to open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TriageError::CatalogLoad("Workbook has no worksheets".to_string()))?
        .map_err(|e| TriageError::CatalogLoad(format!("Failed to read worksheet: {}", e)))?;

    Ok(range
        .rows()
        .skip(1)
        .map(|row| RawRow {
            pattern: row.first().and_then(cell_to_string),
            interpretation: row.get(1).and_then(cell_to_string),
        })
        .collect())
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Accept either a top-level list or a `mappings:` list
fn parse_document(doc: Value) -> Result<Vec<RawRow>, TriageError> {
    let items = match doc {
        Value::Sequence(items) => items,
        Value::Mapping(mut map) => match map.remove("mappings") {
            Some(Value::Sequence(items)) => items,
            _ => {
                return Err(TriageError::CatalogLoad(
                    "Expected a 'mappings' list".to_string(),
                ))
            }
        },
        _ => {
            return Err(TriageError::CatalogLoad(
                "Expected a list of error mappings".to_string(),
            ))
        }
    };

    Ok(items
        .iter()
        .map(|item| RawRow {
            pattern: item.get("pattern").and_then(scalar_to_string),
            interpretation: item.get("interpretation").and_then(scalar_to_string),
        })
        .collect())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(name: &str, content: &str) -> Result<PatternCatalog, TriageError> {
        PatternCatalog::load(&CatalogSource::new(name, content), MatchOptions::default())
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(CatalogFormat::from_name("map.csv").unwrap(), CatalogFormat::Csv);
        assert_eq!(CatalogFormat::from_name("MAP.TSV").unwrap(), CatalogFormat::Tsv);
        assert_eq!(CatalogFormat::from_name("m.yml").unwrap(), CatalogFormat::Yaml);
        assert_eq!(CatalogFormat::from_name("m.json").unwrap(), CatalogFormat::Json);
        assert_eq!(
            CatalogFormat::from_name("error_mappings.xlsx").unwrap(),
            CatalogFormat::Xlsx
        );
        assert_eq!(CatalogFormat::from_name("legacy.XLS").unwrap(), CatalogFormat::Xls);
        assert!(CatalogFormat::from_name("mappings").is_err());
        assert!(CatalogFormat::from_name("notes.docx").is_err());
    }

    #[test]
    fn test_csv_catalog_keeps_order_and_duplicates() {
        let csv = "Error Text,Interpretation\n\
                   OutOfMemory,Heap exhaustion\n\
                   \"Disk, full\",Storage\n\
                   OutOfMemory,Second definition\n";

        let catalog = load("map.csv", csv).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(0).unwrap().interpretation, "Heap exhaustion");
        assert_eq!(catalog.get(1).unwrap().pattern, "Disk, full");
        assert_eq!(catalog.get(2).unwrap().ordinal, 2);
        assert_eq!(catalog.get(2).unwrap().interpretation, "Second definition");
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let csv = "pattern,interpretation\n\
                   OutOfMemory,Heap exhaustion\n\
                   ,Orphan interpretation\n\
                   Segfault,Crash\n\
                   nan,Blank spreadsheet cell\n\
                   Timeout\n";

        let catalog = load("map.csv", csv).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.report().accepted, 3);
        assert_eq!(catalog.report().skipped.len(), 2);
        assert_eq!(catalog.report().skipped[0].row, 2);
        assert_eq!(catalog.report().skipped[1].row, 4);

        // Ordinals are dense over accepted rows
        assert_eq!(catalog.get(1).unwrap().pattern, "Segfault");
        assert_eq!(catalog.get(2).unwrap().pattern, "Timeout");
        assert_eq!(catalog.get(2).unwrap().interpretation, "");
    }

    #[test]
    fn test_cells_are_trimmed() {
        let catalog = load("map.tsv", "a\tb\n  Permission denied \t  Access problem  \n").unwrap();
        let entry = catalog.get(0).unwrap();
        assert_eq!(entry.pattern, "Permission denied");
        assert_eq!(entry.interpretation, "Access problem");
    }

    #[test]
    fn test_header_only_csv_fails() {
        let err = load("map.csv", "pattern,interpretation\n").err().unwrap();
        assert_eq!(err.kind(), "catalog_load_error");
    }

    #[test]
    fn test_all_rows_invalid_fails() {
        let err = load("map.csv", "pattern,interpretation\n,one\n  ,two\n").err().unwrap();
        assert!(matches!(err, TriageError::CatalogLoad(_)));
    }

    #[test]
    fn test_yaml_catalog() {
        let yaml = r#"
mappings:
  - pattern: "OutOfMemory"
    interpretation: "Heap exhaustion"
  - interpretation: "No pattern here"
  - pattern: 404
    interpretation: "Not found"
"#;

        let catalog = load("map.yaml", yaml).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1).unwrap().pattern, "404");
        assert_eq!(catalog.report().skipped.len(), 1);
    }

    #[test]
    fn test_json_catalog_as_list() {
        let json = r#"[
            {"pattern": "Segmentation fault", "interpretation": "Crash"},
            {"pattern": "Failover"}
        ]"#;

        let catalog = load("map.json", json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1).unwrap().interpretation, "");
    }

    #[test]
    fn test_unparseable_document_fails() {
        assert!(load("map.yaml", "mappings: [unclosed").is_err());
        assert!(load("map.json", "{\"mappings\": 3}").is_err());
        assert!(load("map.json", "\"just a string\"").is_err());
    }

    #[test]
    fn test_unsupported_format_fails() {
        let err = load("notes.docx", "PK\u{3}\u{4}").err().unwrap();
        assert!(err.to_string().contains("Unsupported catalog format"));
    }

    #[test]
    fn test_xlsx_catalog() {
        let source = CatalogSource::new(
            "error_mappings.xlsx",
            include_bytes!("../tests/fixtures/error_mappings.xlsx").to_vec(),
        );
        let catalog = PatternCatalog::load(&source, MatchOptions::default()).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get(0).unwrap().pattern, "OutOfMemory");
        assert_eq!(catalog.get(0).unwrap().interpretation, "Heap exhaustion");
        assert_eq!(catalog.get(1).unwrap().pattern, "Segmentation fault");
        assert_eq!(catalog.get(2).unwrap().pattern, "404");

        // Row 2 has an interpretation but a blank pattern cell
        assert_eq!(catalog.report().skipped.len(), 1);
        assert_eq!(catalog.report().skipped[0].row, 2);
    }

    #[test]
    fn test_corrupt_workbook_fails() {
        let err = load("error_mappings.xlsx", "not a zip archive").err().unwrap();
        assert_eq!(err.kind(), "catalog_load_error");

        let err = load("legacy.xls", "not a compound file").err().unwrap();
        assert_eq!(err.kind(), "catalog_load_error");
    }

    #[test]
    fn test_entries_ordered_by_ordinal() {
        let catalog = PatternCatalog::from_entries(
            vec![
                PatternEntry {
                    pattern: "timeout".to_string(),
                    interpretation: "second".to_string(),
                    ordinal: 1,
                },
                PatternEntry {
                    pattern: "timeout".to_string(),
                    interpretation: "first".to_string(),
                    ordinal: 0,
                },
            ],
            MatchOptions::default(),
        );

        assert_eq!(catalog.get(0).unwrap().interpretation, "first");
        assert_eq!(catalog.get(0).unwrap().ordinal, 0);
        assert_eq!(catalog.get(1).unwrap().ordinal, 1);

        let line = crate::scanner::LogLine {
            line_number: 1,
            text: "a timeout".to_string(),
        };
        let record = crate::matcher::match_line(&line, &catalog).unwrap();
        assert_eq!(record.interpretation, "first");
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = PatternCatalog::builtin(MatchOptions::default()).unwrap();
        assert!(!catalog.is_empty());
        assert_eq!(catalog.name(), DEFAULT_CATALOG_NAME);
        assert!(catalog.report().skipped.is_empty());
    }

    #[test]
    fn test_missing_file_fails() {
        let err = CatalogSource::from_path("/nonexistent/map.csv").err().unwrap();
        assert_eq!(err.kind(), "catalog_load_error");
    }
}

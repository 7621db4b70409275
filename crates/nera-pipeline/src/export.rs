//! Batch result export
//!
//! Renders a [`BatchResult`] as flat tabular rows (CSV/TSV, one row per
//! entity) or as nested JSON records. Rendering is deterministic: struct
//! fields serialize in declaration order and every map is a `BTreeMap`, so
//! the same result always produces the same bytes.

use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::aggregator::{BatchEntry, BatchResult, BatchStats, EntryOutcome};
use nera_core::{Document, Entity, FailureRecord, NeraError, Result};

/// Column header of the tabular formats
pub const TABULAR_COLUMNS: [&str; 9] = [
    "document_id",
    "start",
    "end",
    "label",
    "description",
    "confidence",
    "text",
    "linked_id",
    "linked_description",
];

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    Csv,
    Tsv,
    #[default]
    Json,
    JsonLines,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::JsonLines => "jsonl",
        }
    }

    /// File suffix without the dot
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Tsv => "text/tab-separated-values",
            Self::Json => "application/json",
            Self::JsonLines => "application/x-ndjson",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = NeraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::JsonLines),
            other => Err(NeraError::Export(format!("unknown export format: {other}"))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where exported bytes go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Stdout,
}

/// Format plus destination for one export call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub format: ExportFormat,
    pub destination: Destination,
}

impl ExportTarget {
    pub fn file(format: ExportFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            destination: Destination::File(path.into()),
        }
    }

    pub fn stdout(format: ExportFormat) -> Self {
        Self {
            format,
            destination: Destination::Stdout,
        }
    }

    /// Default output path `<stem>.<ext>`
    pub fn default_path(stem: &str, format: ExportFormat) -> PathBuf {
        PathBuf::from(format!("{stem}.{}", format.extension()))
    }
}

/// Export `batch` to `target`, returning the number of bytes written
///
/// The batch is borrowed, so a failed export can be retried.
pub fn export(batch: &BatchResult, target: ExportTarget) -> Result<u64> {
    let bytes = render(batch, target.format)?;

    match target.destination {
        Destination::File(path) => {
            write_file(&path, &bytes)?;
            info!(
                "Exported {} entries as {} to {}",
                batch.len(),
                target.format,
                path.display()
            );
        }
        Destination::Stdout => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(&bytes)
                .and_then(|_| handle.flush())
                .map_err(|e| NeraError::Export(format!("Failed to write to stdout: {e}")))?;
        }
    }

    Ok(bytes.len() as u64)
}

/// Render `batch` into memory
pub fn render(batch: &BatchResult, format: ExportFormat) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_to(batch, format, &mut out)
        .map_err(|e| NeraError::Export(format!("Failed to render {format}: {e}")))?;
    Ok(out)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| NeraError::Export(format!("Cannot create {}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| NeraError::Export(format!("Failed to write {}: {e}", path.display())))
}

fn write_to<W: Write>(batch: &BatchResult, format: ExportFormat, out: &mut W) -> io::Result<()> {
    match format {
        ExportFormat::Csv => write_tabular(batch, ',', out),
        ExportFormat::Tsv => write_tabular(batch, '\t', out),
        ExportFormat::Json => {
            let record = JsonExport::from(batch);
            serde_json::to_writer_pretty(&mut *out, &record)?;
            writeln!(out)
        }
        ExportFormat::JsonLines => {
            for entry in &batch.entries {
                let line = serde_json::to_string(&JsonLine::from(entry))?;
                writeln!(out, "{line}")?;
            }
            Ok(())
        }
    }
}

// ============================================================================
// Tabular
// ============================================================================

fn write_tabular<W: Write>(batch: &BatchResult, sep: char, out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", TABULAR_COLUMNS.join(&sep.to_string()))?;

    for document in batch.documents() {
        for entity in &document.entities {
            let fields = [
                escape_field(&document.source_id, sep),
                entity.start.to_string(),
                entity.end.to_string(),
                escape_field(&entity.label, sep),
                escape_field(entity.description(), sep),
                format!("{:.6}", entity.confidence),
                escape_field(&entity.text, sep),
                escape_field(entity.linked_id.as_deref().unwrap_or(""), sep),
                escape_field(entity.linked_description.as_deref().unwrap_or(""), sep),
            ];
            writeln!(out, "{}", fields.join(&sep.to_string()))?;
        }
    }
    Ok(())
}

/// Quote a field when it contains the separator, a quote or a line break
fn escape_field(s: &str, sep: char) -> String {
    if s.contains(sep) || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// ============================================================================
// Nested JSON
// ============================================================================

#[derive(Serialize)]
struct JsonExport<'a> {
    documents: Vec<JsonDocument<'a>>,
    failures: Vec<JsonFailure<'a>>,
    stats: &'a BatchStats,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    index: usize,
    source_id: &'a str,
    language: Option<&'a str>,
    sentiment: Option<f64>,
    subjectivity: Option<f64>,
    stats: &'a nera_core::TextStats,
    entities: Vec<JsonEntity<'a>>,
}

/// Entity plus its label description
#[derive(Serialize)]
struct JsonEntity<'a> {
    #[serde(flatten)]
    entity: &'a Entity,
    description: &'static str,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    index: usize,
    source_id: &'a str,
    kind: nera_core::FailureKind,
    reason: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum JsonLine<'a> {
    Success(JsonDocument<'a>),
    Failure(JsonFailure<'a>),
}

impl<'a> JsonDocument<'a> {
    fn new(index: usize, document: &'a Document) -> Self {
        Self {
            index,
            source_id: &document.source_id,
            language: document.language.as_deref(),
            sentiment: document.sentiment,
            subjectivity: document.subjectivity,
            stats: &document.stats,
            entities: document
                .entities
                .iter()
                .map(|entity| JsonEntity {
                    entity,
                    description: entity.description(),
                })
                .collect(),
        }
    }
}

impl<'a> JsonFailure<'a> {
    fn new(index: usize, source_id: &'a str, failure: &'a FailureRecord) -> Self {
        Self {
            index,
            source_id,
            kind: failure.kind,
            reason: &failure.reason,
        }
    }
}

impl<'a> From<&'a BatchResult> for JsonExport<'a> {
    fn from(batch: &'a BatchResult) -> Self {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for entry in &batch.entries {
            match &entry.outcome {
                EntryOutcome::Success(document) => {
                    documents.push(JsonDocument::new(entry.index, document))
                }
                EntryOutcome::Failure(failure) => {
                    failures.push(JsonFailure::new(entry.index, &entry.source_id, failure))
                }
            }
        }

        Self {
            documents,
            failures,
            stats: &batch.stats,
        }
    }
}

impl<'a> From<&'a BatchEntry> for JsonLine<'a> {
    fn from(entry: &'a BatchEntry) -> Self {
        match &entry.outcome {
            EntryOutcome::Success(document) => {
                JsonLine::Success(JsonDocument::new(entry.index, document))
            }
            EntryOutcome::Failure(failure) => {
                JsonLine::Failure(JsonFailure::new(entry.index, &entry.source_id, failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use nera_enrich::{EnrichmentResult, EntityLink};
    use nera_extractor::ExtractedEntity;
    use nera_parser::RawDocument;

    fn sample_batch() -> BatchResult {
        let mut aggregator = Aggregator::new();
        let text = "Apple Inc. was founded by Steve Jobs.";
        aggregator.add(
            0,
            RawDocument {
                source_id: "text-000001".to_string(),
                text: text.to_string(),
                lossy: false,
            },
            vec![
                ExtractedEntity::from_span(text, 0, 10, "ORG", 0.9),
                ExtractedEntity::from_span(text, 26, 36, "PERSON", 0.95),
            ],
            EnrichmentResult {
                language: Some("en".to_string()),
                sentiment: Some(0.2),
                subjectivity: Some(0.6),
                links: vec![
                    Some(EntityLink::new("Q312").with_description("American technology company")),
                    None,
                ],
                ..Default::default()
            },
        );

        let quoted = "He said \"Acme, Ltd.\" twice.";
        aggregator.add(
            1,
            RawDocument {
                source_id: "notes, draft.txt".to_string(),
                text: quoted.to_string(),
                lossy: false,
            },
            vec![ExtractedEntity::from_span(quoted, 8, 20, "ORG", 0.5)],
            EnrichmentResult::default(),
        );

        aggregator.record_failure(
            2,
            "text-000003",
            FailureRecord::from(&NeraError::empty_input()),
        );
        aggregator.finish()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("tsv".parse::<ExportFormat>().unwrap(), ExportFormat::Tsv);
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::JsonLines);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::JsonLines.extension(), "jsonl");
    }

    #[test]
    fn test_csv_rows_and_quoting() {
        let csv = String::from_utf8(render(&sample_batch(), ExportFormat::Csv).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "document_id,start,end,label,description,confidence,text,linked_id,linked_description"
        );
        assert_eq!(
            lines[1],
            "text-000001,0,10,ORG,\"Companies, agencies, institutions, etc.\",0.900000,\
             Apple Inc.,Q312,American technology company"
        );
        assert_eq!(
            lines[2],
            "text-000001,26,36,PERSON,\"People, including fictional\",0.950000,Steve Jobs,,"
        );
        assert_eq!(
            lines[3],
            "\"notes, draft.txt\",8,20,ORG,\"Companies, agencies, institutions, etc.\",\
             0.500000,\"\"\"Acme, Ltd.\"\"\",,"
        );
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_tsv_uses_tabs() {
        let tsv = String::from_utf8(render(&sample_batch(), ExportFormat::Tsv).unwrap()).unwrap();
        let second = tsv.lines().nth(1).unwrap();
        assert_eq!(
            second,
            "text-000001\t0\t10\tORG\tCompanies, agencies, institutions, etc.\t0.900000\t\
             Apple Inc.\tQ312\tAmerican technology company"
        );
    }

    #[test]
    fn test_json_structure() {
        let json = render(&sample_batch(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();

        assert_eq!(value["documents"].as_array().unwrap().len(), 2);
        assert_eq!(value["documents"][0]["source_id"], "text-000001");
        assert_eq!(value["documents"][0]["language"], "en");
        assert_eq!(value["documents"][0]["subjectivity"], 0.6);
        assert_eq!(value["documents"][1]["subjectivity"], serde_json::Value::Null);

        let apple = &value["documents"][0]["entities"][0];
        assert_eq!(apple["linked_id"], "Q312");
        assert_eq!(apple["linked_description"], "American technology company");
        assert_eq!(apple["description"], "Companies, agencies, institutions, etc.");
        assert_eq!(
            value["documents"][0]["entities"][1]["description"],
            "People, including fictional"
        );
        assert_eq!(value["stats"]["truncated"], 0);
        assert_eq!(value["failures"][0]["kind"], "validation");
        assert_eq!(value["failures"][0]["reason"], "empty input");
        assert_eq!(value["stats"]["successes"], 2);
        assert_eq!(value["stats"]["label_counts"]["ORG"], 2);
    }

    #[test]
    fn test_json_lines_one_record_per_entry() {
        let jsonl =
            String::from_utf8(render(&sample_batch(), ExportFormat::JsonLines).unwrap()).unwrap();
        let records: Vec<serde_json::Value> = jsonl
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["status"], "success");
        assert_eq!(records[2]["status"], "failure");
        assert_eq!(records[2]["index"], 2);
    }

    #[test]
    fn test_export_is_deterministic() {
        let batch = sample_batch();
        for format in [
            ExportFormat::Csv,
            ExportFormat::Tsv,
            ExportFormat::Json,
            ExportFormat::JsonLines,
        ] {
            assert_eq!(render(&batch, format).unwrap(), render(&batch, format).unwrap());
        }
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let batch = sample_batch();

        let written = export(&batch, ExportTarget::file(ExportFormat::Csv, &path)).unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk.len() as u64, written);
        assert_eq!(on_disk, render(&batch, ExportFormat::Csv).unwrap());
    }

    #[test]
    fn test_unwritable_destination_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let err = export(&sample_batch(), ExportTarget::file(ExportFormat::Json, path)).unwrap_err();
        assert!(matches!(err, NeraError::Export(_)));
    }
}

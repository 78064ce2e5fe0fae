//! Result export: the sorted evaluation table as CSV and the run summary as
//! JSON.

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tracing::info;

use cf_types::{CfError, CfResult, ResultTable, RunResult, RunSummary};

/// Destination for the outcome of a successful run.
pub trait ResultSink: Send + Sync {
    fn export(&self, result: &RunResult, summary: &RunSummary) -> CfResult<()>;
}

fn export_error(path: &Path, e: impl std::fmt::Display) -> CfError {
    CfError::Export(format!("{}: {}", path.display(), e))
}

fn ensure_parent(path: &Path) -> CfResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| export_error(path, e))
        }
        _ => Ok(()),
    }
}

/// Writes the result table, header row first.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_table(&self, table: &ResultTable) -> CfResult<()> {
        ensure_parent(&self.path)?;
        let mut writer = WriterBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| export_error(&self.path, e))?;

        writer
            .write_record(&table.columns)
            .map_err(|e| export_error(&self.path, e))?;
        for row in &table.rows {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| export_error(&self.path, e))?;
        }
        writer.flush().map_err(|e| export_error(&self.path, e))?;

        info!(path = %self.path.display(), rows = table.len(), "wrote result table");
        Ok(())
    }
}

impl ResultSink for CsvExporter {
    fn export(&self, result: &RunResult, _summary: &RunSummary) -> CfResult<()> {
        self.write_table(&result.table)
    }
}

/// Writes the run summary as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct SummaryExporter {
    path: PathBuf,
}

impl SummaryExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ResultSink for SummaryExporter {
    fn export(&self, _result: &RunResult, summary: &RunSummary) -> CfResult<()> {
        ensure_parent(&self.path)?;
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&self.path, json).map_err(|e| export_error(&self.path, e))?;
        info!(path = %self.path.display(), "wrote run summary");
        Ok(())
    }
}

/// Fans one export out to several sinks, stopping at the first failure.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultSink for MultiSink {
    fn export(&self, result: &RunResult, summary: &RunSummary) -> CfResult<()> {
        for sink in &self.sinks {
            sink.export(result, summary)?;
        }
        Ok(())
    }
}

/// Read a table previously written by [`CsvExporter`].
pub fn load_result_table(path: impl AsRef<Path>) -> CfResult<ResultTable> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| export_error(path, e))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| export_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| export_error(path, e))?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    export_error(path, format!("line {}: `{field}` is not a number", line + 2))
                })
            })
            .collect::<CfResult<Vec<f64>>>()?;
        rows.push(row);
    }

    Ok(ResultTable { columns, rows })
}

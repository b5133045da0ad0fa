//! Column-oriented storage for simulation telemetry.
//!
//! Typed event rows are appended into dynamically-built tables (one table
//! per event kind); the schema emerges from the recorded rows. Columns are
//! nullable throughout because telemetry rows routinely carry absent fields
//! (`partner_id` of an idle agent, `dm` of a barter trade). Tables convert
//! to polars `DataFrame`s for analysis and persist as parquet or CSV.
//!
//! # Usage
//!
//! ```ignore
//! let mut recorder = Recorder::default();
//! recorder.push_row("trade", &[
//!     ("tick", Value::from(tick)),
//!     ("price", Value::from(price)),
//!     ("dm", Value::from(None::<u64>)),
//! ]);
//! let frames = recorder.to_dataframes();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

// === VALUES ===

/// One nullable cell of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U64(Option<u64>),
    I64(Option<i64>),
    F64(Option<f64>),
    Bool(Option<bool>),
    Str(Option<String>),
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(Some(v))
    }
}

impl From<Option<u64>> for Value {
    fn from(v: Option<u64>) -> Self {
        Value::U64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(Some(v))
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(Some(v))
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(Some(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Some(v.to_string()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Some(v))
    }
}

// === COLUMNS ===

/// A nullable column of typed values.
#[derive(Debug, Clone)]
pub enum TypedColumn {
    U64(Vec<Option<u64>>),
    I64(Vec<Option<i64>>),
    F64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl TypedColumn {
    fn for_value(value: &Value, rows: usize) -> Self {
        match value {
            Value::U64(_) => TypedColumn::U64(vec![None; rows]),
            Value::I64(_) => TypedColumn::I64(vec![None; rows]),
            Value::F64(_) => TypedColumn::F64(vec![None; rows]),
            Value::Bool(_) => TypedColumn::Bool(vec![None; rows]),
            Value::Str(_) => TypedColumn::Str(vec![None; rows]),
        }
    }

    fn push(&mut self, value: &Value) {
        match (self, value) {
            (TypedColumn::U64(col), Value::U64(v)) => col.push(*v),
            (TypedColumn::I64(col), Value::I64(v)) => col.push(*v),
            (TypedColumn::F64(col), Value::F64(v)) => col.push(*v),
            (TypedColumn::Bool(col), Value::Bool(v)) => col.push(*v),
            (TypedColumn::Str(col), Value::Str(v)) => col.push(v.clone()),
            (col, value) => panic!("column type mismatch: {col:?} cannot take {value:?}"),
        }
    }

    fn push_null(&mut self) {
        match self {
            TypedColumn::U64(col) => col.push(None),
            TypedColumn::I64(col) => col.push(None),
            TypedColumn::F64(col) => col.push(None),
            TypedColumn::Bool(col) => col.push(None),
            TypedColumn::Str(col) => col.push(None),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(col) => col.len(),
            TypedColumn::I64(col) => col.len(),
            TypedColumn::F64(col) => col.len(),
            TypedColumn::Bool(col) => col.len(),
            TypedColumn::Str(col) => col.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// === TABLES ===

/// A table with dynamically-typed nullable columns, kept rectangular: every
/// row push pads columns the row did not mention.
#[derive(Debug, Clone, Default)]
pub struct DynamicTable {
    pub columns: HashMap<String, TypedColumn>,
    pub row_count: usize,
}

impl DynamicTable {
    fn push_row(&mut self, row: &[(&'static str, Value)]) {
        for (name, value) in row {
            let col = self
                .columns
                .entry((*name).to_string())
                .or_insert_with(|| TypedColumn::for_value(value, self.row_count));
            col.push(value);
        }
        self.row_count += 1;
        // Columns absent from this row get a null so everything stays
        // aligned.
        for col in self.columns.values_mut() {
            while col.len() < self.row_count {
                col.push_null();
            }
        }
    }
}

// === RECORDER ===

/// Collection of tables keyed by event kind.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, DynamicTable>,
}

impl Recorder {
    pub fn push_row(&mut self, table: &str, row: &[(&'static str, Value)]) {
        self.tables.entry(table.to_string()).or_default().push_row(row);
    }

    pub fn table(&self, name: &str) -> Option<&DynamicTable> {
        self.tables.get(name)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.row_count)
    }
}

// === POLARS INTEGRATION ===

use polars::prelude::*;

impl DynamicTable {
    /// Convert this table to a polars DataFrame. Columns come out in name
    /// order so frames compare stably across runs.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();
        let mut columns: Vec<Column> = Vec::with_capacity(names.len());
        for name in names {
            let column = match &self.columns[name] {
                TypedColumn::U64(v) => Column::new(name.into(), v),
                TypedColumn::I64(v) => Column::new(name.into(), v),
                TypedColumn::F64(v) => Column::new(name.into(), v),
                TypedColumn::Bool(v) => Column::new(name.into(), v),
                TypedColumn::Str(v) => Column::new(name.into(), v),
            };
            columns.push(column);
        }
        DataFrame::new(columns)
    }
}

impl Recorder {
    /// Convert all tables to polars DataFrames.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

/// On-disk formats the scoped recorder can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Parquet,
    Csv,
}

/// Save every table as `{dir}/{name}.parquet` or `{dir}/{name}.csv`.
pub fn save(recorder: &Recorder, dir: &Path, format: OutputFormat) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| PolarsError::IO {
        error: e.into(),
        msg: None,
    })?;
    for (name, table) in &recorder.tables {
        let mut df = table.to_dataframe()?;
        match format {
            OutputFormat::Parquet => {
                let file = open(&dir.join(format!("{name}.parquet")))?;
                ParquetWriter::new(file).finish(&mut df)?;
            }
            OutputFormat::Csv => {
                let file = open(&dir.join(format!("{name}.csv")))?;
                CsvWriter::new(file).finish(&mut df)?;
            }
        }
    }
    Ok(())
}

fn open(path: &Path) -> PolarsResult<std::fs::File> {
    std::fs::File::create(path).map_err(|e| PolarsError::IO {
        error: e.into(),
        msg: None,
    })
}

/// RAII guard that persists its recorder on drop and marks the directory
/// with a `_ready` sentinel so downstream analysis knows the run completed.
pub struct ScopedRecorder {
    run_dir: PathBuf,
    format: OutputFormat,
    recorder: Option<Recorder>,
}

impl ScopedRecorder {
    pub fn new(run_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            run_dir: run_dir.into(),
            format,
            recorder: Some(Recorder::default()),
        }
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        self.recorder.as_mut().expect("recorder already persisted")
    }

    /// Hand a fully-populated recorder to the guard (e.g. one drained from a
    /// simulation sink).
    pub fn set_recorder(&mut self, recorder: Recorder) {
        self.recorder = Some(recorder);
    }

    /// Write now instead of at drop; returns the run directory.
    pub fn finish(mut self) -> PolarsResult<PathBuf> {
        self.write()?;
        Ok(self.run_dir.clone())
    }

    fn write(&mut self) -> PolarsResult<()> {
        let Some(recorder) = self.recorder.take() else {
            return Ok(());
        };
        save(&recorder, &self.run_dir, self.format)?;
        let _ = std::fs::write(self.run_dir.join("_ready"), b"");
        Ok(())
    }
}

impl Drop for ScopedRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.write() {
            eprintln!("instrument: failed to persist {:?}: {e}", self.run_dir);
        }
    }
}

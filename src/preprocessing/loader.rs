//! Загрузка сырых CSV-данных

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{parse_cell, RawTable};

pub fn load_csv(path: &Path) -> PipelineResult<RawTable> {
    let source = path.display().to_string();
    if !path.is_file() {
        return Err(PipelineError::data_source(source, "file not found"));
    }
    let file = File::open(path).map_err(|e| PipelineError::data_source(&source, e))?;
    read_table(file, &source)
}

/// Чтение таблицы из произвольного источника; `source` используется в ошибках
pub fn read_table<R: Read>(reader: R, source: &str) -> PipelineResult<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| PipelineError::data_source(source, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(PipelineError::data_source(source, "missing header row"));
    }

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record
            .map_err(|e| PipelineError::data_source(source, format!("row {}: {}", i + 1, e)))?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    if rows.is_empty() {
        return Err(PipelineError::data_source(source, "contains no data rows"));
    }

    RawTable::new(columns, rows).map_err(|e| match e {
        PipelineError::DataSource { reason, .. } => PipelineError::data_source(source, reason),
        other => other,
    })
}

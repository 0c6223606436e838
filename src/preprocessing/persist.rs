//! Запись и чтение обработанной таблицы

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::types::{ColumnRole, ColumnSpec, ProcessedTable, Value};

/// Путь к файлу с параметрами рядом с таблицей: `<output>.params.json`
pub fn params_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".params.json");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::persistence(parent.display().to_string(), e))?;
    }
    Ok(())
}

/// Записывает таблицу целиком, перезаписывая существующий файл
pub fn write_csv(table: &ProcessedTable, path: &Path) -> PipelineResult<()> {
    let target = path.display().to_string();
    ensure_parent(path)?;

    let mut writer =
        csv::Writer::from_path(path).map_err(|e| PipelineError::persistence(&target, e))?;
    writer
        .write_record(table.header())
        .map_err(|e| PipelineError::persistence(&target, e))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(Value::render))
            .map_err(|e| PipelineError::persistence(&target, e))?;
    }
    writer.flush().map_err(|e| PipelineError::persistence(&target, e))?;
    Ok(())
}

pub fn write_json<T: Serialize>(value: &T, path: &Path) -> PipelineResult<()> {
    let target = path.display().to_string();
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::persistence(&target, e))?;
    std::fs::write(path, json).map_err(|e| PipelineError::persistence(&target, e))
}

/// Читает ранее сохраненную таблицу. Роли колонок определяются по имени метки:
/// `<label>` - целочисленный код, `<label>_<value>` - индикатор, остальное - признаки
pub fn read_processed(path: &Path, label_column: &str) -> PipelineResult<ProcessedTable> {
    let source = path.display().to_string();
    let mut rdr = csv::Reader::from_path(path).map_err(|e| PipelineError::data_source(&source, e))?;

    let prefix = format!("{}_", label_column);
    let columns: Vec<ColumnSpec> = rdr
        .headers()
        .map_err(|e| PipelineError::data_source(&source, e))?
        .iter()
        .map(|name| {
            let role = if name == label_column {
                ColumnRole::Ordinal
            } else if let Some(value) = name.strip_prefix(&prefix) {
                ColumnRole::Indicator { value: value.to_string() }
            } else {
                ColumnRole::Feature
            };
            ColumnSpec { name: name.to_string(), role }
        })
        .collect();

    if !columns.iter().any(|c| c.role != ColumnRole::Feature) {
        return Err(PipelineError::Schema {
            stage: Stage::Validate,
            column: label_column.to_string(),
            available: columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
        });
    }

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record
            .map_err(|e| PipelineError::data_source(&source, format!("row {}: {}", i + 1, e)))?;
        let row = record
            .iter()
            .zip(&columns)
            .map(|(raw, spec)| parse_value(raw, &spec.role))
            .collect();
        rows.push(row);
    }

    Ok(ProcessedTable { columns, rows })
}

fn parse_value(raw: &str, role: &ColumnRole) -> Value {
    let raw = raw.trim();
    if *role != ColumnRole::Feature {
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Int(v);
        }
    }
    match raw.parse::<f64>() {
        Ok(v) => Value::Float(v),
        Err(_) => Value::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProcessedTable {
        ProcessedTable {
            columns: vec![
                ColumnSpec { name: "SepalLength".into(), role: ColumnRole::Feature },
                ColumnSpec {
                    name: "Species_setosa".into(),
                    role: ColumnRole::Indicator { value: "setosa".into() },
                },
                ColumnSpec {
                    name: "Species_versicolor".into(),
                    role: ColumnRole::Indicator { value: "versicolor".into() },
                },
            ],
            rows: vec![
                vec![Value::Float(-0.5), Value::Int(1), Value::Int(0)],
                vec![Value::Float(1.25), Value::Int(0), Value::Int(1)],
            ],
        }
    }

    #[test]
    fn test_params_path() {
        assert_eq!(
            params_path(Path::new("out/iris.csv")),
            PathBuf::from("out/iris.csv.params.json")
        );
    }

    #[test]
    fn test_write_creates_directories_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/iris.csv");
        write_csv(&sample(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "SepalLength,Species_setosa,Species_versicolor\n-0.5,1,0\n1.25,0,1\n"
        );

        let table = read_processed(&path, "Species").unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn test_read_without_label_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iris.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let err = read_processed(&path, "Species").unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }
}

/// Типы данных для пайплайна предобработки

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult, Stage};

/// Сырая ячейка: `None` означает пропуск
pub type Cell = Option<String>;

/// Токены, которые считаются пропуском (после trim)
pub const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

pub fn parse_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if MISSING_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Таблица в исходном виде: уникальные имена колонок и строки в порядке файла
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> PipelineResult<Self> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(PipelineError::data_source(
                    "<table>",
                    format!("duplicate column name '{}'", name),
                ));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PipelineError::data_source(
                    "<table>",
                    format!(
                        "row {} has {} fields, expected {}",
                        i + 1,
                        row.len(),
                        columns.len()
                    ),
                ));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub(crate) fn remove_column(&mut self, idx: usize) -> String {
        for row in &mut self.rows {
            row.remove(idx);
        }
        self.columns.remove(idx)
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<Cell>> {
        &mut self.rows
    }

    pub fn missing_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.iter())
            .filter(|cell| cell.is_none())
            .count()
    }

    /// Тип колонки по парсируемости значений; `None` если все значения пропущены
    pub fn column_kind(&self, idx: usize) -> Option<ColumnKind> {
        let mut seen = false;
        for cell in self.column(idx) {
            if let Some(value) = cell {
                seen = true;
                if value.parse::<f64>().is_err() {
                    return Some(ColumnKind::Categorical);
                }
            }
        }
        seen.then_some(ColumnKind::Numeric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Способ кодирования метки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Отдельная бинарная колонка на каждое значение метки
    #[default]
    Indicator,
    /// Одна целочисленная колонка
    Ordinal,
}

impl FromStr for EncodingMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "indicator" | "onehot" | "one-hot" => Ok(EncodingMode::Indicator),
            "ordinal" | "label" => Ok(EncodingMode::Ordinal),
            other => Err(PipelineError::config(
                "encoding_mode",
                format!("expected 'indicator' or 'ordinal', got '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingMode::Indicator => f.write_str("indicator"),
            EncodingMode::Ordinal => f.write_str("ordinal"),
        }
    }
}

/// Значение в обработанной таблице
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Text(_) => None,
        }
    }

    /// Текстовое представление для CSV; float всегда с точкой или экспонентой
    pub fn render(&self) -> String {
        match self {
            Value::Float(v) => format!("{:?}", v),
            Value::Int(v) => v.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

/// Роль колонки в обработанной таблице
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Feature,
    /// Индикатор конкретного значения метки
    Indicator { value: String },
    /// Целочисленный код метки
    Ordinal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
}

/// Итоговая таблица: признаки + представление метки, по строке на каждую строку после очистки
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTable {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Value>>,
}

impl ProcessedTable {
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn feature_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == ColumnRole::Feature)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn label_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role != ColumnRole::Feature)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Матрица числовых признаков (строки x признаки)
    pub fn feature_matrix(&self) -> PipelineResult<Array2<f64>> {
        let features = self.feature_columns();
        let mut matrix = Array2::zeros((self.rows.len(), features.len()));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, &col) in features.iter().enumerate() {
                matrix[[i, j]] = row[col].as_f64().ok_or_else(|| PipelineError::Schema {
                    stage: Stage::Validate,
                    column: self.columns[col].name.clone(),
                    available: "numeric feature columns".to_string(),
                })?;
            }
        }
        Ok(matrix)
    }

    /// Индексы классов по строкам и имена классов.
    ///
    /// Для порядковой метки `classes` задает имена по кодам (сохраненное
    /// отображение кодировщика). Без него имена строятся из встреченных кодов,
    /// а индексы классов перенумеровываются подряд.
    pub fn class_targets(
        &self,
        classes: Option<&[String]>,
    ) -> PipelineResult<(Vec<usize>, Vec<String>)> {
        let labels = self.label_columns();
        let missing_label = || PipelineError::Schema {
            stage: Stage::Validate,
            column: "<label>".to_string(),
            available: self.header().join(", "),
        };
        let first = *labels.first().ok_or_else(missing_label)?;

        if self.columns[first].role == ColumnRole::Ordinal {
            let column = &self.columns[first].name;
            let mut codes = Vec::with_capacity(self.rows.len());
            for row in &self.rows {
                let code = match &row[first] {
                    Value::Int(v) if *v >= 0 => *v as u64,
                    Value::Float(v) if *v >= 0.0 && v.fract() == 0.0 => *v as u64,
                    other => {
                        return Err(PipelineError::InvalidValue {
                            stage: Stage::Validate,
                            column: column.clone(),
                            value: other.render(),
                        })
                    }
                };
                codes.push(code);
            }

            if let Some(classes) = classes {
                let mut targets = Vec::with_capacity(codes.len());
                for code in codes {
                    let idx = usize::try_from(code)
                        .ok()
                        .filter(|&i| i < classes.len())
                        .ok_or_else(|| PipelineError::UnknownLabel {
                            stage: Stage::Validate,
                            column: column.clone(),
                            value: code.to_string(),
                        })?;
                    targets.push(idx);
                }
                return Ok((targets, classes.to_vec()));
            }

            let distinct: Vec<u64> =
                codes.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
            let targets = codes
                .iter()
                .filter_map(|code| distinct.binary_search(code).ok())
                .collect();
            let names = distinct.iter().map(u64::to_string).collect();
            return Ok((targets, names));
        }

        let names: Vec<String> = labels
            .iter()
            .map(|&i| match &self.columns[i].role {
                ColumnRole::Indicator { value } => value.clone(),
                _ => self.columns[i].name.clone(),
            })
            .collect();
        let mut targets = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            // idxmax: первая колонка с максимальным значением
            let mut best = 0usize;
            let mut best_val = f64::NEG_INFINITY;
            for (k, &col) in labels.iter().enumerate() {
                let v = row[col].as_f64().ok_or_else(missing_label)?;
                if v > best_val {
                    best_val = v;
                    best = k;
                }
            }
            targets.push(best);
        }
        Ok((targets, names))
    }
}

/// Отчет об очистке данных
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_loaded: usize,
    pub duplicates_removed: usize,
    pub identifier_dropped: bool,
    /// колонка -> количество заполненных пропусков
    pub imputed: BTreeMap<String, usize>,
}

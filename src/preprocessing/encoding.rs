//! Кодирование метки: индикаторные колонки или целочисленные коды

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::types::{ColumnRole, ColumnSpec, EncodingMode, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    column: String,
    mode: EncodingMode,
    /// Отсортированные уникальные значения; индекс = код
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(
        column: &str,
        mode: EncodingMode,
        values: impl IntoIterator<Item = &'a str>,
    ) -> PipelineResult<Self> {
        let classes: Vec<String> = values
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        if classes.is_empty() {
            return Err(PipelineError::Schema {
                stage: Stage::Encode,
                column: column.to_string(),
                available: "no label values".to_string(),
            });
        }

        Ok(Self {
            column: column.to_string(),
            mode,
            classes,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Код значения метки (индекс в отсортированном списке)
    pub fn code(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    /// Обратное преобразование кода в значение
    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    /// Колонки, которые добавляются в итоговую таблицу
    pub fn output_columns(&self) -> Vec<ColumnSpec> {
        match self.mode {
            EncodingMode::Indicator => self
                .classes
                .iter()
                .map(|value| ColumnSpec {
                    name: format!("{}_{}", self.column, value),
                    role: ColumnRole::Indicator { value: value.clone() },
                })
                .collect(),
            EncodingMode::Ordinal => vec![ColumnSpec {
                name: self.column.clone(),
                role: ColumnRole::Ordinal,
            }],
        }
    }

    pub fn encode(&self, value: &str) -> PipelineResult<Vec<Value>> {
        let code = self.code(value).ok_or_else(|| PipelineError::UnknownLabel {
            stage: Stage::Encode,
            column: self.column.clone(),
            value: value.to_string(),
        })?;

        Ok(match self.mode {
            EncodingMode::Indicator => (0..self.classes.len())
                .map(|i| Value::Int(i64::from(i == code)))
                .collect(),
            EncodingMode::Ordinal => vec![Value::Int(code as i64)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECIES: [&str; 5] = ["versicolor", "setosa", "virginica", "setosa", "versicolor"];

    #[test]
    fn test_indicator_columns_sorted() {
        let encoder = LabelEncoder::fit("Species", EncodingMode::Indicator, SPECIES).unwrap();
        let names: Vec<String> = encoder.output_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["Species_setosa", "Species_versicolor", "Species_virginica"]
        );
    }

    #[test]
    fn test_indicator_exactly_one_hot() {
        let encoder = LabelEncoder::fit("Species", EncodingMode::Indicator, SPECIES).unwrap();
        for value in SPECIES {
            let encoded = encoder.encode(value).unwrap();
            let ones = encoded.iter().filter(|v| **v == Value::Int(1)).count();
            assert_eq!(ones, 1);
            assert_eq!(encoded.len(), 3);
        }
    }

    #[test]
    fn test_ordinal_codes_are_stable_and_recoverable() {
        let first = LabelEncoder::fit("Species", EncodingMode::Ordinal, SPECIES).unwrap();
        let mut reversed = SPECIES;
        reversed.reverse();
        let second = LabelEncoder::fit("Species", EncodingMode::Ordinal, reversed).unwrap();
        assert_eq!(first, second);

        assert_eq!(first.encode("setosa").unwrap(), vec![Value::Int(0)]);
        assert_eq!(first.encode("virginica").unwrap(), vec![Value::Int(2)]);
        assert_eq!(first.decode(1), Some("versicolor"));
        assert_eq!(first.output_columns()[0].role, ColumnRole::Ordinal);
    }

    #[test]
    fn test_unknown_label() {
        let encoder = LabelEncoder::fit("Species", EncodingMode::Ordinal, SPECIES).unwrap();
        let err = encoder.encode("unknown").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownLabel { .. }));
    }
}

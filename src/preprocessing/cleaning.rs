//! Очистка данных: удаление идентификатора, дубликатов и заполнение пропусков

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::types::{Cell, ColumnKind, RawTable};

/// Удаляет колонку-идентификатор, если она есть. Возвращает true, если колонка была удалена
pub fn drop_identifier(table: &mut RawTable, identifier: Option<&str>) -> bool {
    match identifier.and_then(|name| table.column_index(name)) {
        Some(idx) => {
            table.remove_column(idx);
            true
        }
        None => false,
    }
}

/// Удаляет точные дубликаты строк, оставляя первое вхождение
pub fn deduplicate(table: &mut RawTable) -> usize {
    let before = table.n_rows();
    let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(before);
    table.rows_mut().retain(|row| seen.insert(row.clone()));
    before - table.n_rows()
}

/// Значение для заполнения пропусков в колонке
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FillValue {
    Median(f64),
    Mode(String),
}

impl FillValue {
    fn as_cell(&self) -> String {
        match self {
            FillValue::Median(v) => v.to_string(),
            FillValue::Mode(s) => s.clone(),
        }
    }
}

/// Заполнение пропусков: медиана для числовых колонок, мода для категориальных
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    fills: Vec<(String, FillValue)>,
}

impl Imputer {
    pub fn fit(table: &RawTable) -> PipelineResult<Self> {
        let mut fills = Vec::with_capacity(table.columns().len());

        for (idx, name) in table.columns().iter().enumerate() {
            let fill = match table.column_kind(idx) {
                Some(ColumnKind::Numeric) => {
                    let mut values: Vec<f64> = table
                        .column(idx)
                        .flatten()
                        .filter_map(|v| v.parse::<f64>().ok())
                        .collect();
                    FillValue::Median(median(&mut values))
                }
                Some(ColumnKind::Categorical) => {
                    FillValue::Mode(mode(table.column(idx).flatten()).unwrap_or_default())
                }
                None => {
                    return Err(PipelineError::Imputation {
                        stage: Stage::Impute,
                        column: name.clone(),
                        reason: "all values are missing".to_string(),
                    });
                }
            };
            fills.push((name.clone(), fill));
        }

        Ok(Self { fills })
    }

    /// Заполняет пропуски; возвращает количество заполненных значений по колонкам
    pub fn transform(&self, table: &mut RawTable) -> PipelineResult<BTreeMap<String, usize>> {
        let mut targets = Vec::with_capacity(table.columns().len());
        for (idx, name) in table.columns().iter().enumerate() {
            let fill = self
                .fills
                .iter()
                .find(|(col, _)| col == name)
                .map(|(_, fill)| fill.as_cell())
                .ok_or_else(|| PipelineError::Imputation {
                    stage: Stage::Impute,
                    column: name.clone(),
                    reason: "column was not seen at fit time".to_string(),
                })?;
            targets.push((idx, name.clone(), fill));
        }

        let mut counts = BTreeMap::new();
        for (idx, name, fill) in targets {
            let mut filled = 0usize;
            for row in table.rows_mut().iter_mut() {
                if row[idx].is_none() {
                    row[idx] = Some(fill.clone());
                    filled += 1;
                }
            }
            if filled > 0 {
                tracing::debug!(column = %name, filled, "Imputed missing values");
                counts.insert(name, filled);
            }
        }
        Ok(counts)
    }

    pub fn fill_value(&self, column: &str) -> Option<&FillValue> {
        self.fills.iter().find(|(c, _)| c == column).map(|(_, f)| f)
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Самое частое значение; при равенстве побеждает встреченное первым
fn mode<'a>(values: impl Iterator<Item = &'a String>) -> Option<String> {
    let mut order: Vec<&'a String> = Vec::new();
    let mut counts: HashMap<&'a String, usize> = HashMap::new();
    for value in values {
        let count = counts.entry(value).or_insert_with(|| {
            order.push(value);
            0
        });
        *count += 1;
    }

    let mut best: Option<(&String, usize)> = None;
    for value in order {
        let count = counts[value];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_cell;

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| parse_cell(v)).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_drop_identifier_is_idempotent() {
        let mut t = table(&["Id", "x"], &[&["1", "2.0"]]);
        assert!(drop_identifier(&mut t, Some("Id")));
        assert!(!drop_identifier(&mut t, Some("Id")));
        assert!(!drop_identifier(&mut t, None));
        assert_eq!(t.columns(), &["x"]);
    }

    #[test]
    fn test_deduplicate_keeps_first() {
        let mut t = table(
            &["x", "s"],
            &[&["1", "a"], &["2", "b"], &["1", "a"], &["1", ""], &["1", ""]],
        );
        assert_eq!(deduplicate(&mut t), 2);
        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.rows()[0][1].as_deref(), Some("a"));
        assert_eq!(t.rows()[2][1], None);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_mode_tie_breaks_on_first_seen() {
        let values: Vec<String> = ["b", "a", "a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(mode(values.iter()).as_deref(), Some("b"));
    }

    #[test]
    fn test_impute_fills_every_missing_value() {
        let mut t = table(
            &["x", "s"],
            &[&["1.0", "a"], &["", "b"], &["3.0", "b"], &["10.0", ""]],
        );
        let imputer = Imputer::fit(&t).unwrap();
        assert_eq!(imputer.fill_value("x"), Some(&FillValue::Median(3.0)));
        assert_eq!(imputer.fill_value("s"), Some(&FillValue::Mode("b".to_string())));

        let counts = imputer.transform(&mut t).unwrap();
        assert_eq!(counts.get("x"), Some(&1));
        assert_eq!(counts.get("s"), Some(&1));
        assert_eq!(t.missing_count(), 0);
        assert_eq!(t.rows()[1][0].as_deref(), Some("3"));
    }

    #[test]
    fn test_entirely_missing_column_fails() {
        let t = table(&["x", "empty"], &[&["1", ""], &["2", "NA"]]);
        let err = Imputer::fit(&t).unwrap_err();
        match err {
            PipelineError::Imputation { column, .. } => assert_eq!(column, "empty"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

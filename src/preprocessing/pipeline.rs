//! Пайплайн предобработки с порядком этапов, проверяемым на этапе компиляции
//!
//! ```text
//! Unloaded -> Loaded -> Cleaned -> Encoded -> Normalized -> Persisted
//! ```
//!
//! Каждый этап потребляет результат предыдущего; пропустить этап или вернуться назад нельзя.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cleaning::{deduplicate, drop_identifier, Imputer};
use super::encoding::LabelEncoder;
use super::loader::load_csv;
use super::normalization::{DataNormalizer, ScalerParams};
use super::persist::{params_path, write_csv, write_json};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::types::{
    CleaningReport, ColumnKind, ColumnRole, ColumnSpec, ProcessedTable, RawTable, Value,
};

/// Маркер состояния пайплайна
pub trait PipelineState {}

pub struct Unloaded;

pub struct Loaded {
    table: RawTable,
}

pub struct Cleaned {
    table: RawTable,
}

pub struct Encoded {
    table: ProcessedTable,
    encoder: LabelEncoder,
    feature_kinds: Vec<(String, ColumnKind)>,
}

pub struct Normalized {
    table: ProcessedTable,
    scaler: Option<ScalerParams>,
}

pub struct Persisted {
    table: ProcessedTable,
}

impl PipelineState for Unloaded {}
impl PipelineState for Loaded {}
impl PipelineState for Cleaned {}
impl PipelineState for Encoded {}
impl PipelineState for Normalized {}
impl PipelineState for Persisted {}

/// Обученное состояние предобработки; применимо к новым данным без повторного обучения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub identifier_column: Option<String>,
    pub imputer: Imputer,
    pub encoder: LabelEncoder,
    pub feature_kinds: Vec<(String, ColumnKind)>,
    pub scaler: Option<ScalerParams>,
}

impl FittedPreprocessor {
    pub fn transform(&self, mut raw: RawTable) -> PipelineResult<ProcessedTable> {
        drop_identifier(&mut raw, self.identifier_column.as_deref());
        self.imputer.transform(&mut raw)?;
        let label_idx = require_column(&raw, self.encoder.column(), Stage::Validate)?;
        let mut table = assemble(&raw, label_idx, &self.feature_kinds, &self.encoder)?;
        if let Some(params) = &self.scaler {
            apply_scaler(&mut table, &DataNormalizer::from_params(params.clone()))?;
        }
        Ok(table)
    }

    /// Читает параметры, сохраненные рядом с таблицей `output`
    pub fn load(output: &Path) -> PipelineResult<Self> {
        let path = params_path(output);
        let source = path.display().to_string();
        let text =
            std::fs::read_to_string(&path).map_err(|e| PipelineError::data_source(&source, e))?;
        serde_json::from_str(&text).map_err(|e| PipelineError::data_source(&source, e))
    }

    /// Отображение кода метки в исходное значение
    pub fn label_mapping(&self) -> Vec<(usize, String)> {
        self.encoder.classes().iter().cloned().enumerate().collect()
    }
}

/// Результат полного прогона
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub table: ProcessedTable,
    pub fitted: FittedPreprocessor,
    pub report: CleaningReport,
}

pub struct Pipeline<S: PipelineState> {
    config: PipelineConfig,
    report: CleaningReport,
    fitted: Partial,
    state: S,
}

/// Параметры, накопленные пройденными этапами
#[derive(Default)]
struct Partial {
    imputer: Option<Imputer>,
    encoder: Option<LabelEncoder>,
    feature_kinds: Vec<(String, ColumnKind)>,
    scaler: Option<ScalerParams>,
}

impl Partial {
    fn finish(&self, config: &PipelineConfig) -> PipelineResult<FittedPreprocessor> {
        let missing = |what: &str| PipelineError::config(what, "stage output missing");
        Ok(FittedPreprocessor {
            identifier_column: config.identifier_column.clone(),
            imputer: self.imputer.clone().ok_or_else(|| missing("imputer"))?,
            encoder: self.encoder.clone().ok_or_else(|| missing("encoder"))?,
            feature_kinds: self.feature_kinds.clone(),
            scaler: self.scaler.clone(),
        })
    }
}

impl<S: PipelineState> Pipeline<S> {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn report(&self) -> &CleaningReport {
        &self.report
    }
}

impl Pipeline<Unloaded> {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            report: CleaningReport::default(),
            fitted: Partial::default(),
            state: Unloaded,
        })
    }

    /// Загрузка и проверка наличия колонки метки
    pub fn load(self, source: &Path) -> PipelineResult<Pipeline<Loaded>> {
        let table = load_csv(source)?;
        self.accept(table)
    }

    /// Прием уже прочитанной таблицы
    pub fn accept(mut self, table: RawTable) -> PipelineResult<Pipeline<Loaded>> {
        require_column(&table, &self.config.label_column, Stage::Validate)?;
        self.report.rows_loaded = table.n_rows();
        info!(
            rows = table.n_rows(),
            columns = table.columns().len(),
            "Loaded raw table"
        );
        Ok(Pipeline {
            config: self.config,
            report: self.report,
            fitted: self.fitted,
            state: Loaded { table },
        })
    }
}

impl Pipeline<Loaded> {
    pub fn table(&self) -> &RawTable {
        &self.state.table
    }

    /// Удаление идентификатора, дубликатов и заполнение пропусков
    pub fn clean(self) -> PipelineResult<Pipeline<Cleaned>> {
        let Pipeline { config, mut report, mut fitted, state: Loaded { mut table } } = self;

        report.identifier_dropped =
            drop_identifier(&mut table, config.identifier_column.as_deref());
        if let Some(id) = &config.identifier_column {
            debug!(column = %id, dropped = report.identifier_dropped, "Identifier column");
        }

        if config.deduplicate {
            report.duplicates_removed = deduplicate(&mut table);
            info!(removed = report.duplicates_removed, "Removed duplicate rows");
        }

        let imputer = Imputer::fit(&table)?;
        report.imputed = imputer.transform(&mut table)?;
        if !report.imputed.is_empty() {
            info!(columns = ?report.imputed, "Filled missing values");
        }
        fitted.imputer = Some(imputer);

        Ok(Pipeline { config, report, fitted, state: Cleaned { table } })
    }
}

impl Pipeline<Cleaned> {
    pub fn table(&self) -> &RawTable {
        &self.state.table
    }

    pub fn encode(self) -> PipelineResult<Pipeline<Encoded>> {
        let Pipeline { config, report, mut fitted, state: Cleaned { table: raw } } = self;
        let label_idx = require_column(&raw, &config.label_column, Stage::Encode)?;

        let encoder = LabelEncoder::fit(
            &config.label_column,
            config.encoding_mode,
            raw.column(label_idx).flatten().map(String::as_str),
        )?;
        info!(
            mode = %encoder.mode(),
            classes = ?encoder.classes(),
            "Encoded label column"
        );

        let feature_kinds: Vec<(String, ColumnKind)> = raw
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(i, name)| {
                let kind = raw.column_kind(i).unwrap_or(ColumnKind::Categorical);
                (name.clone(), kind)
            })
            .collect();

        // Имена колонок метки не должны совпадать с признаками
        if let Some(clash) = encoder
            .output_columns()
            .into_iter()
            .find(|spec| feature_kinds.iter().any(|(name, _)| *name == spec.name))
        {
            return Err(PipelineError::DuplicateColumn { stage: Stage::Encode, column: clash.name });
        }

        let table = assemble(&raw, label_idx, &feature_kinds, &encoder)?;

        fitted.encoder = Some(encoder.clone());
        fitted.feature_kinds = feature_kinds.clone();
        Ok(Pipeline {
            config,
            report,
            fitted,
            state: Encoded { table, encoder, feature_kinds },
        })
    }
}

impl Pipeline<Encoded> {
    pub fn table(&self) -> &ProcessedTable {
        &self.state.table
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.state.encoder
    }

    /// Стандартизация числовых признаков (колонки метки не затрагиваются)
    #[allow(non_snake_case)]
    pub fn normalize(self) -> PipelineResult<Pipeline<Normalized>> {
        let Pipeline {
            config,
            report,
            mut fitted,
            state: Encoded { mut table, feature_kinds, .. },
        } = self;

        let numeric: Vec<String> = feature_kinds
            .iter()
            .filter(|(_, kind)| *kind == ColumnKind::Numeric)
            .map(|(name, _)| name.clone())
            .collect();

        let scaler = if !config.normalize {
            debug!("Normalization disabled");
            None
        } else if numeric.is_empty() {
            warn!("No numeric feature columns to normalize");
            None
        } else {
            let mut normalizer = DataNormalizer::new(numeric);
            let X = numeric_matrix(&table, normalizer.columns())?;
            normalizer.fit(&X)?;
            apply_scaler(&mut table, &normalizer)?;
            info!(columns = ?normalizer.columns(), "Normalized numeric features");
            normalizer.params()
        };

        fitted.scaler = scaler.clone();
        Ok(Pipeline { config, report, fitted, state: Normalized { table, scaler } })
    }
}

impl Pipeline<Normalized> {
    pub fn table(&self) -> &ProcessedTable {
        &self.state.table
    }

    pub fn scaler(&self) -> Option<&ScalerParams> {
        self.state.scaler.as_ref()
    }

    /// Запись таблицы и параметров предобработки
    pub fn persist(self) -> PipelineResult<Pipeline<Persisted>> {
        let Pipeline { config, report, fitted, state: Normalized { table, .. } } = self;
        let output = &config.output_path;

        // Параметры собираются до записи, чтобы не оставить таблицу без них
        let params = fitted.finish(&config)?;
        write_csv(&table, output)?;
        write_json(&params, &params_path(output))?;
        info!(
            path = %output.display(),
            rows = table.n_rows(),
            columns = table.columns.len(),
            "Persisted processed table"
        );

        Ok(Pipeline { config, report, fitted, state: Persisted { table } })
    }
}

impl Pipeline<Persisted> {
    pub fn table(&self) -> &ProcessedTable {
        &self.state.table
    }

    pub fn into_outcome(self) -> PipelineResult<ProcessOutcome> {
        let fitted = self.fitted.finish(&self.config)?;
        Ok(ProcessOutcome {
            table: self.state.table,
            fitted,
            report: self.report,
        })
    }
}

/// Полный прогон: загрузка -> очистка -> кодирование -> нормализация -> запись
pub struct TabularPreprocessor;

impl TabularPreprocessor {
    pub fn process(raw_source: &Path, config: &PipelineConfig) -> PipelineResult<ProcessOutcome> {
        info!(source = %raw_source.display(), "Starting preprocessing");
        Pipeline::new(config.clone())?
            .load(raw_source)?
            .clean()?
            .encode()?
            .normalize()?
            .persist()?
            .into_outcome()
    }
}

fn require_column(table: &RawTable, name: &str, stage: Stage) -> PipelineResult<usize> {
    table.column_index(name).ok_or_else(|| PipelineError::Schema {
        stage,
        column: name.to_string(),
        available: table.columns().join(", "),
    })
}

/// Сборка итоговой таблицы: признаки в заданном порядке, затем колонки метки
fn assemble(
    raw: &RawTable,
    label_idx: usize,
    feature_kinds: &[(String, ColumnKind)],
    encoder: &LabelEncoder,
) -> PipelineResult<ProcessedTable> {
    let mut feature_idx = Vec::with_capacity(feature_kinds.len());
    for (name, kind) in feature_kinds {
        feature_idx.push((require_column(raw, name, Stage::Encode)?, name, *kind));
    }

    let mut columns: Vec<ColumnSpec> = feature_kinds
        .iter()
        .map(|(name, _)| ColumnSpec { name: name.clone(), role: ColumnRole::Feature })
        .collect();
    columns.extend(encoder.output_columns());

    let mut rows = Vec::with_capacity(raw.n_rows());
    for row in raw.rows() {
        let mut out = Vec::with_capacity(columns.len());
        for &(idx, name, kind) in &feature_idx {
            let cell = row[idx].as_deref().unwrap_or_default();
            out.push(match kind {
                ColumnKind::Numeric => Value::Float(cell.parse::<f64>().map_err(|_| {
                    PipelineError::InvalidValue {
                        stage: Stage::Encode,
                        column: name.clone(),
                        value: cell.to_string(),
                    }
                })?),
                ColumnKind::Categorical => Value::Text(cell.to_string()),
            });
        }
        let label = row[label_idx].as_deref().unwrap_or_default();
        out.extend(encoder.encode(label)?);
        rows.push(out);
    }

    Ok(ProcessedTable { columns, rows })
}

#[allow(non_snake_case)]
fn numeric_matrix(table: &ProcessedTable, columns: &[String]) -> PipelineResult<Array2<f64>> {
    let mut idx = Vec::with_capacity(columns.len());
    for name in columns {
        idx.push(table.column_index(name).ok_or_else(|| PipelineError::Schema {
            stage: Stage::Normalize,
            column: name.clone(),
            available: table.header().join(", "),
        })?);
    }

    let mut X = Array2::zeros((table.n_rows(), idx.len()));
    for (i, row) in table.rows.iter().enumerate() {
        for (j, &col) in idx.iter().enumerate() {
            X[[i, j]] = row[col].as_f64().ok_or_else(|| PipelineError::InvalidValue {
                stage: Stage::Normalize,
                column: columns[j].clone(),
                value: row[col].render(),
            })?;
        }
    }
    Ok(X)
}

#[allow(non_snake_case)]
fn apply_scaler(table: &mut ProcessedTable, normalizer: &DataNormalizer) -> PipelineResult<()> {
    let columns = normalizer.columns();
    let X = numeric_matrix(table, columns)?;
    let Z = normalizer.transform(&X)?;

    let idx: Vec<usize> = columns
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    for (i, row) in table.rows.iter_mut().enumerate() {
        for (j, &col) in idx.iter().enumerate() {
            row[col] = Value::Float(Z[[i, j]]);
        }
    }
    Ok(())
}

//! Конфигурация пайплайна: JSON-файл, переменные окружения и явные переопределения

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::types::EncodingMode;

/// Префикс переменных окружения
pub const ENV_PREFIX: &str = "IRIS_ML_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub identifier_column: Option<String>,
    pub label_column: String,
    #[serde(default)]
    pub encoding_mode: EncodingMode,
    pub output_path: PathBuf,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    pub fn new(label_column: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            identifier_column: None,
            label_column: label_column.into(),
            encoding_mode: EncodingMode::default(),
            output_path: output_path.into(),
            deduplicate: true,
            normalize: true,
        }
    }

    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = Some(column.into());
        self
    }

    pub fn with_encoding_mode(mut self, mode: EncodingMode) -> Self {
        self.encoding_mode = mode;
        self
    }

    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Загрузка из JSON-файла
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::config(path.display().to_string(), e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::config(path.display().to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Применение пар ключ/значение; ключи без учета регистра, с префиксом или без
    pub fn apply_overrides<I, K, V>(&mut self, overrides: I) -> PipelineResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in overrides {
            let raw_key = key.as_ref().trim();
            let key = raw_key
                .strip_prefix(ENV_PREFIX)
                .unwrap_or(raw_key)
                .to_ascii_lowercase();
            let value = value.as_ref().trim();

            match key.as_str() {
                "identifier_column" => {
                    self.identifier_column = (!value.is_empty()).then(|| value.to_string());
                }
                "label_column" => self.label_column = value.to_string(),
                "encoding_mode" => self.encoding_mode = value.parse()?,
                "output_path" => self.output_path = PathBuf::from(value),
                "deduplicate" => self.deduplicate = parse_bool(&key, value)?,
                "normalize" => self.normalize = parse_bool(&key, value)?,
                _ => return Err(PipelineError::config(raw_key, "unknown configuration key")),
            }
        }
        self.validate()
    }

    /// Переопределения из переменных окружения `IRIS_ML_*`
    pub fn apply_env(&mut self) -> PipelineResult<()> {
        let vars: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        self.apply_overrides(vars)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.label_column.trim().is_empty() {
            return Err(PipelineError::config("label_column", "must not be empty"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(PipelineError::config("output_path", "must not be empty"));
        }
        if self.identifier_column.as_deref() == Some(self.label_column.as_str()) {
            return Err(PipelineError::config(
                "identifier_column",
                "must differ from label_column",
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> PipelineResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PipelineError::config(key, format!("expected boolean, got '{}'", other))),
    }
}

/// Настройки обучения классификатора
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default)]
    pub param_grid: ParamGrid,
}

fn default_test_size() -> f64 {
    0.3
}

fn default_seed() -> u64 {
    42
}

fn default_cv_folds() -> usize {
    5
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_seed(),
            cv_folds: default_cv_folds(),
            param_grid: ParamGrid::default(),
        }
    }
}

/// Сетка гиперпараметров дерева решений
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    /// `None` = без ограничения глубины
    pub max_depth: Vec<Option<usize>>,
    pub split_quality: Vec<SplitCriterion>,
    pub min_weight_leaf: Vec<f32>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            max_depth: vec![Some(2), Some(3), Some(5), None],
            split_quality: vec![SplitCriterion::Gini, SplitCriterion::Entropy],
            min_weight_leaf: vec![1.0],
        }
    }
}

impl ParamGrid {
    /// Все комбинации в детерминированном порядке
    pub fn candidates(&self) -> Vec<TreeParams> {
        let mut out = Vec::new();
        for &max_depth in &self.max_depth {
            for &split_quality in &self.split_quality {
                for &min_weight_leaf in &self.min_weight_leaf {
                    out.push(TreeParams { max_depth, split_quality, min_weight_leaf });
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitCriterion {
    Gini,
    Entropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub split_quality: SplitCriterion,
    pub min_weight_leaf: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"label_column": "Species", "output_path": "out.csv"}"#)
                .unwrap();
        assert_eq!(config.identifier_column, None);
        assert_eq!(config.encoding_mode, EncodingMode::Indicator);
        assert!(config.deduplicate);
        assert!(config.normalize);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PipelineConfig::new("Species", "out.csv");
        config
            .apply_overrides([
                ("IRIS_ML_IDENTIFIER_COLUMN", "Id"),
                ("encoding_mode", "ordinal"),
                ("NORMALIZE", "false"),
            ])
            .unwrap();
        assert_eq!(config.identifier_column.as_deref(), Some("Id"));
        assert_eq!(config.encoding_mode, EncodingMode::Ordinal);
        assert!(!config.normalize);
    }

    #[test]
    fn test_unknown_override_key() {
        let mut config = PipelineConfig::new("Species", "out.csv");
        let err = config.apply_overrides([("colour", "red")]).unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn test_bad_boolean() {
        let mut config = PipelineConfig::new("Species", "out.csv");
        assert!(config.apply_overrides([("deduplicate", "maybe")]).is_err());
    }

    #[test]
    fn test_validate_rejects_label_as_identifier() {
        let config = PipelineConfig::new("Species", "out.csv").with_identifier_column("Species");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_param_grid_candidates() {
        let grid = ParamGrid::default();
        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 8);
        assert_eq!(candidates[0].max_depth, Some(2));
        assert_eq!(candidates[0].split_quality, SplitCriterion::Gini);
    }
}

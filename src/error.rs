//! Ошибки пайплайна и обучения

use thiserror::Error;

/// Этап пайплайна, на котором произошла ошибка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Validate,
    DropIdentifier,
    Deduplicate,
    Impute,
    Encode,
    Normalize,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Validate => "validate",
            Stage::DropIdentifier => "drop-identifier",
            Stage::Deduplicate => "deduplicate",
            Stage::Impute => "impute",
            Stage::Encode => "encode",
            Stage::Normalize => "normalize",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[{stage}] data source error for '{path}': {reason}")]
    DataSource {
        stage: Stage,
        path: String,
        reason: String,
    },

    #[error("[{stage}] required column '{column}' is missing (available: {available})")]
    Schema {
        stage: Stage,
        column: String,
        available: String,
    },

    #[error("[{stage}] output column '{column}' would appear twice")]
    DuplicateColumn { stage: Stage, column: String },

    #[error("[{stage}] cannot impute column '{column}': {reason}")]
    Imputation {
        stage: Stage,
        column: String,
        reason: String,
    },

    #[error("[{stage}] column '{column}' has zero standard deviation")]
    DegenerateColumn { stage: Stage, column: String },

    #[error("[{stage}] column '{column}' expects numeric values, got '{value}'")]
    InvalidValue {
        stage: Stage,
        column: String,
        value: String,
    },

    #[error("[{stage}] label '{value}' in column '{column}' was not seen at fit time")]
    UnknownLabel {
        stage: Stage,
        column: String,
        value: String,
    },

    #[error("[{stage}] cannot write '{path}': {reason}")]
    Persistence {
        stage: Stage,
        path: String,
        reason: String,
    },

    #[error("invalid configuration for '{key}': {reason}")]
    Config { key: String, reason: String },
}

impl PipelineError {
    pub fn data_source(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataSource {
            stage: Stage::Load,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Persistence {
            stage: Stage::Persist,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Config {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Этап, на котором произошла ошибка (для конфигурации этапа нет)
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::DataSource { stage, .. }
            | Self::Schema { stage, .. }
            | Self::DuplicateColumn { stage, .. }
            | Self::Imputation { stage, .. }
            | Self::DegenerateColumn { stage, .. }
            | Self::InvalidValue { stage, .. }
            | Self::UnknownLabel { stage, .. }
            | Self::Persistence { stage, .. } => Some(*stage),
            Self::Config { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("not enough data: {0}")]
    InsufficientData(String),

    #[error("invalid training table: {0}")]
    InvalidTable(String),

    #[error("invalid training parameter: {0}")]
    InvalidParameter(String),

    #[error("model fit failed: {0}")]
    Fit(String),

    #[error("tracking error: {0}")]
    Tracking(String),
}

impl From<std::io::Error> for TrainingError {
    fn from(err: std::io::Error) -> Self {
        TrainingError::Tracking(err.to_string())
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(err: serde_json::Error) -> Self {
        TrainingError::Tracking(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

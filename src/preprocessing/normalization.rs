//! Нормализация данных

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult, Stage};

/// Параметры обученного нормализатора, пригодные для сохранения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

pub struct DataNormalizer {
    columns: Vec<String>,
    mean: Option<Array1<f64>>,
    std: Option<Array1<f64>>,
    is_fitted: bool,
}

impl DataNormalizer {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            mean: None,
            std: None,
            is_fitted: false,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn fit(&mut self, X: &Array2<f64>) -> PipelineResult<()> {
        if X.ncols() != self.columns.len() {
            return Err(self.shape_error(X.ncols()));
        }
        let mean = X.mean_axis(Axis(0)).ok_or_else(|| PipelineError::DataSource {
            stage: Stage::Normalize,
            path: "<table>".to_string(),
            reason: "empty dataset".to_string(),
        })?;
        // Популяционное стандартное отклонение (ddof = 0)
        let std = X.std_axis(Axis(0), 0.0);

        // Деление на ноль недопустимо: нулевая дисперсия - ошибка.
        // Для одинаковых значений std_axis (алгоритм Уэлфорда) дает ровно 0
        if let Some(idx) = std.iter().position(|s| !s.is_finite() || *s == 0.0) {
            return Err(PipelineError::DegenerateColumn {
                stage: Stage::Normalize,
                column: self.columns[idx].clone(),
            });
        }

        self.mean = Some(mean);
        self.std = Some(std);
        self.is_fitted = true;
        Ok(())
    }

    pub fn transform(&self, X: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        let (mean, std) = match (&self.mean, &self.std) {
            (Some(mean), Some(std)) if self.is_fitted => (mean, std),
            _ => {
                return Err(PipelineError::DataSource {
                    stage: Stage::Normalize,
                    path: "<table>".to_string(),
                    reason: "normalizer not fitted".to_string(),
                })
            }
        };
        if X.ncols() != mean.len() {
            return Err(self.shape_error(X.ncols()));
        }

        // Нормализация: (X - mean) / std
        let mut normalized = X.clone();
        for mut row in normalized.rows_mut() {
            for (i, val) in row.iter_mut().enumerate() {
                *val = (*val - mean[i]) / std[i];
            }
        }

        Ok(normalized)
    }

    pub fn fit_transform(&mut self, X: &Array2<f64>) -> PipelineResult<Array2<f64>> {
        self.fit(X)?;
        self.transform(X)
    }

    pub fn params(&self) -> Option<ScalerParams> {
        match (&self.mean, &self.std) {
            (Some(mean), Some(std)) => Some(ScalerParams {
                columns: self.columns.clone(),
                mean: mean.to_vec(),
                std: std.to_vec(),
            }),
            _ => None,
        }
    }

    pub fn from_params(params: ScalerParams) -> Self {
        Self {
            columns: params.columns,
            mean: Some(Array1::from(params.mean)),
            std: Some(Array1::from(params.std)),
            is_fitted: true,
        }
    }

    fn shape_error(&self, got: usize) -> PipelineError {
        PipelineError::Schema {
            stage: Stage::Normalize,
            column: format!("{} numeric columns (got {})", self.columns.len(), got),
            available: self.columns.join(", "),
        }
    }
}

//! Классификатор на основе дерева решений с подбором гиперпараметров по сетке

#![allow(non_snake_case)]

use linfa::prelude::*;
use linfa::Dataset;
use linfa_tree::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::metrics::{accuracy, ClassificationMetrics};
use super::split::{stratified_folds, stratified_split};
use crate::config::{SplitCriterion, TrainingConfig, TreeParams};
use crate::error::TrainingError;
use crate::tracking::TrackingSession;
use crate::types::ProcessedTable;

/// Результат кросс-валидации одной комбинации параметров
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvResult {
    pub params: TreeParams,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

/// Краткое описание обученной модели
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_class: String,
    pub params: TreeParams,
    pub depth: usize,
    pub leaves: usize,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub best_params: TreeParams,
    pub best_cv_score: f64,
    pub cv_results: Vec<CvResult>,
    pub metrics: ClassificationMetrics,
    pub n_train: usize,
    pub n_test: usize,
    pub model: ModelSummary,
}

pub struct ClassifierTrainer {
    config: TrainingConfig,
    class_names: Option<Vec<String>>,
}

impl ClassifierTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config, class_names: None }
    }

    /// Имена классов по порядковым кодам метки (из сохраненного кодировщика)
    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = Some(class_names);
        self
    }

    /// Разбиение, подбор по сетке, финальное обучение и оценка на отложенной выборке
    pub fn train(&self, table: &ProcessedTable) -> Result<TrainingReport, TrainingError> {
        let X = table
            .feature_matrix()
            .map_err(|e| TrainingError::InvalidTable(e.to_string()))?;
        let (targets, class_names) = table
            .class_targets(self.class_names.as_deref())
            .map_err(|e| TrainingError::InvalidTable(e.to_string()))?;
        if X.ncols() == 0 {
            return Err(TrainingError::InvalidTable("no feature columns".to_string()));
        }

        let (train_idx, test_idx) =
            stratified_split(&targets, self.config.test_size, self.config.seed)?;
        let X_train = X.select(Axis(0), &train_idx);
        let X_test = X.select(Axis(0), &test_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| targets[i]).collect();
        let y_test: Vec<usize> = test_idx.iter().map(|&i| targets[i]).collect();
        info!(
            n_train = y_train.len(),
            n_test = y_test.len(),
            features = X.ncols(),
            "Split data"
        );

        let candidates = self.config.param_grid.candidates();
        if candidates.is_empty() {
            return Err(TrainingError::InvalidParameter("parameter grid is empty".to_string()));
        }

        let folds = stratified_folds(&y_train, self.config.cv_folds, self.config.seed)?;
        let mut cv_results = Vec::with_capacity(candidates.len());
        for params in candidates {
            let mut fold_scores = Vec::with_capacity(folds.len());
            for (fit_idx, valid_idx) in &folds {
                let (X_fit, y_fit) = subset(&X_train, &y_train, fit_idx);
                let (X_valid, y_valid) = subset(&X_train, &y_train, valid_idx);
                let model = fit_tree(&params, &X_fit, &y_fit)?;
                let predicted: Array1<usize> = model.predict(&X_valid);
                fold_scores.push(accuracy(&y_valid, &predicted.to_vec()));
            }
            let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
            debug!(?params, mean_score, "Cross-validated candidate");
            cv_results.push(CvResult { params, mean_score, fold_scores });
        }

        // При равенстве выигрывает первая комбинация в порядке сетки
        let best = cv_results
            .iter()
            .fold(None::<&CvResult>, |best, r| match best {
                Some(b) if b.mean_score >= r.mean_score => Some(b),
                _ => Some(r),
            })
            .ok_or_else(|| TrainingError::InvalidParameter("parameter grid is empty".to_string()))?
            .clone();
        info!(params = ?best.params, score = best.mean_score, "Grid search finished");

        let model = fit_tree(&best.params, &X_train, &y_train)?;
        let predicted: Array1<usize> = model.predict(&X_test);
        let metrics = ClassificationMetrics::compute(&y_test, &predicted.to_vec());
        info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1_weighted,
            "Evaluated best model on held-out split"
        );

        let feature_names = table
            .feature_columns()
            .iter()
            .map(|&i| table.columns[i].name.clone())
            .collect();

        Ok(TrainingReport {
            best_params: best.params,
            best_cv_score: best.mean_score,
            cv_results,
            metrics,
            n_train: y_train.len(),
            n_test: y_test.len(),
            model: ModelSummary {
                model_class: "DecisionTree".to_string(),
                params: best.params,
                depth: model.max_depth(),
                leaves: model.num_leaves(),
                feature_names,
                class_names,
            },
        })
    }

    /// Обучение с записью тегов, параметров, метрик и артефактов в сессию трекинга
    pub fn train_tracked(
        &self,
        table: &ProcessedTable,
        session: &mut TrackingSession,
    ) -> Result<TrainingReport, TrainingError> {
        session.set_tag("model_type", "Decision Tree with Tuning");
        session.set_tag(
            "data_split",
            format!(
                "{:.0}-{:.0}",
                (1.0 - self.config.test_size) * 100.0,
                self.config.test_size * 100.0
            ),
        );
        session.set_tag("tuning_method", "GridSearchCV");
        session.log_param("tuning_cv", self.config.cv_folds);
        session.log_param("tuning_scoring", "accuracy");
        session.log_param("seed", self.config.seed);

        let report = self.train(table)?;

        let best = &report.best_params;
        session.log_param(
            "best_max_depth",
            best.max_depth.map_or_else(|| "none".to_string(), |d| d.to_string()),
        );
        session.log_param("best_split_quality", format!("{:?}", best.split_quality).to_lowercase());
        session.log_param("best_min_weight_leaf", best.min_weight_leaf);
        session.log_param("model_class", &report.model.model_class);

        session.log_metric("accuracy", report.metrics.accuracy)?;
        session.log_metric("precision_weighted", report.metrics.precision_weighted)?;
        session.log_metric("recall_weighted", report.metrics.recall_weighted)?;
        session.log_metric("f1_weighted", report.metrics.f1_weighted)?;
        session.log_metric("best_cv_accuracy", report.best_cv_score)?;

        session.log_artifact_json("model_best_tuned", &report.model)?;
        session.log_artifact_json("cv_results", &report.cv_results)?;
        Ok(report)
    }
}

fn subset(X: &Array2<f64>, y: &[usize], idx: &[usize]) -> (Array2<f64>, Vec<usize>) {
    let X_sub = X.select(Axis(0), idx);
    let y_sub = idx.iter().map(|&i| y[i]).collect();
    (X_sub, y_sub)
}

fn fit_tree(
    params: &TreeParams,
    X: &Array2<f64>,
    y: &[usize],
) -> Result<DecisionTree<f64, usize>, TrainingError> {
    let split_quality = match params.split_quality {
        SplitCriterion::Gini => SplitQuality::Gini,
        SplitCriterion::Entropy => SplitQuality::Entropy,
    };
    let dataset = Dataset::new(X.clone(), Array1::from(y.to_vec()));
    DecisionTree::params()
        .split_quality(split_quality)
        .max_depth(params.max_depth)
        .min_weight_leaf(params.min_weight_leaf)
        .fit(&dataset)
        .map_err(|e| TrainingError::Fit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamGrid;
    use crate::types::{ColumnRole, ColumnSpec, Value};

    /// Два хорошо разделимых класса по первому признаку
    fn separable_table() -> ProcessedTable {
        let mut rows = Vec::new();
        for i in 0..20 {
            let class = i % 2;
            let x = if class == 0 { -2.0 - i as f64 * 0.1 } else { 2.0 + i as f64 * 0.1 };
            rows.push(vec![
                Value::Float(x),
                Value::Float((i % 5) as f64),
                Value::Int(i64::from(class == 0)),
                Value::Int(i64::from(class == 1)),
            ]);
        }
        ProcessedTable {
            columns: vec![
                ColumnSpec { name: "a".into(), role: ColumnRole::Feature },
                ColumnSpec { name: "b".into(), role: ColumnRole::Feature },
                ColumnSpec {
                    name: "Species_x".into(),
                    role: ColumnRole::Indicator { value: "x".into() },
                },
                ColumnSpec {
                    name: "Species_y".into(),
                    role: ColumnRole::Indicator { value: "y".into() },
                },
            ],
            rows,
        }
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            cv_folds: 3,
            param_grid: ParamGrid {
                max_depth: vec![Some(2), Some(4)],
                split_quality: vec![SplitCriterion::Gini],
                min_weight_leaf: vec![1.0],
            },
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_train_separable_data() {
        let report = ClassifierTrainer::new(small_config()).train(&separable_table()).unwrap();
        assert_eq!(report.n_train + report.n_test, 20);
        assert_eq!(report.cv_results.len(), 2);
        assert_eq!(report.metrics.accuracy, 1.0);
        // обе глубины дают 1.0, выигрывает первая
        assert_eq!(report.best_params.max_depth, Some(2));
        assert_eq!(report.model.class_names, vec!["x", "y"]);
        assert_eq!(report.model.feature_names, vec!["a", "b"]);
    }

    #[test]
    fn test_train_is_deterministic() {
        let trainer = ClassifierTrainer::new(small_config());
        let first = trainer.train(&separable_table()).unwrap();
        let second = trainer.train(&separable_table()).unwrap();
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.best_params, second.best_params);
    }

    #[test]
    fn test_train_tracked_logs_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = TrackingSession::open(dir.path(), "iris").unwrap();
        let trainer = ClassifierTrainer::new(small_config());
        trainer.train_tracked(&separable_table(), &mut session).unwrap();
        let record = session.finish().unwrap();

        assert_eq!(record.tags.get("data_split").map(String::as_str), Some("70-30"));
        assert_eq!(record.params.get("best_max_depth").map(String::as_str), Some("2"));
        for key in ["accuracy", "precision_weighted", "recall_weighted", "f1_weighted"] {
            let value = record.metrics[key];
            assert!((0.0..=1.0).contains(&value), "{} = {}", key, value);
        }
        assert!(record.artifacts.contains(&"model_best_tuned.json".to_string()));
    }

    #[test]
    fn test_table_without_features() {
        let mut table = separable_table();
        table.columns.drain(..2);
        for row in &mut table.rows {
            row.drain(..2);
        }
        let err = ClassifierTrainer::new(small_config()).train(&table).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidTable(_)));
    }

    #[test]
    fn test_ordinal_table_uses_retained_class_names() {
        let mut table = separable_table();
        table.columns.truncate(2);
        table.columns.push(ColumnSpec { name: "Species".into(), role: ColumnRole::Ordinal });
        for row in &mut table.rows {
            let code = if row[2] == Value::Int(1) { 0 } else { 1 };
            row.truncate(2);
            row.push(Value::Int(code));
        }

        let trainer = ClassifierTrainer::new(small_config())
            .with_class_names(vec!["setosa".to_string(), "versicolor".to_string()]);
        let report = trainer.train(&table).unwrap();
        assert_eq!(report.model.class_names, vec!["setosa", "versicolor"]);
        assert_eq!(report.metrics.accuracy, 1.0);

        let bare = ClassifierTrainer::new(small_config()).train(&table).unwrap();
        assert_eq!(bare.model.class_names, vec!["0", "1"]);
    }
}

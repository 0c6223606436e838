/// Обучение классификатора на обработанной таблице

pub mod classifier;
pub mod metrics;
pub mod split;

pub use classifier::{ClassifierTrainer, CvResult, ModelSummary, TrainingReport};
pub use metrics::ClassificationMetrics;
pub use split::{stratified_folds, stratified_split};

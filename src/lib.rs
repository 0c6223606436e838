//! Iris ML - предобработка табличных данных и подбор классификатора

pub mod config;
pub mod error;
pub mod models;
pub mod preprocessing;
pub mod tracking;
pub mod types;

pub use config::{PipelineConfig, TrainingConfig};
pub use error::{PipelineError, PipelineResult, Stage, TrainingError};
pub use models::{ClassifierTrainer, TrainingReport};
pub use preprocessing::{FittedPreprocessor, Pipeline, ProcessOutcome, TabularPreprocessor};
pub use tracking::TrackingSession;
pub use types::*;

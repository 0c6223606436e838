/// Модуль предобработки данных

pub mod cleaning;
pub mod encoding;
pub mod loader;
pub mod normalization;
pub mod persist;
pub mod pipeline;

pub use cleaning::{FillValue, Imputer};
pub use encoding::LabelEncoder;
pub use loader::{load_csv, read_table};
pub use normalization::{DataNormalizer, ScalerParams};
pub use persist::{params_path, read_processed, write_csv};
pub use pipeline::{FittedPreprocessor, Pipeline, ProcessOutcome, TabularPreprocessor};

//! Файловый трекинг экспериментов
//!
//! Сессия открывается явно на каждый запуск и закрывается через `finish()`.
//! Если сессия уничтожена без `finish()` (ошибка или паника), запуск помечается как `FAILED`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::TrainingError;
use crate::preprocessing::params_path;

const RUN_FILE: &str = "run.json";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Содержимое `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub experiment: String,
    pub run_id: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<String>,
}

impl RunRecord {
    pub fn load(run_dir: &Path) -> Result<Self, TrainingError> {
        let text = std::fs::read_to_string(run_dir.join(RUN_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }
}

pub struct TrackingSession {
    run_dir: PathBuf,
    record: RunRecord,
    closed: bool,
}

impl TrackingSession {
    /// Создает `<root>/<experiment>/<run_id>/` и записывает начальный `run.json`
    pub fn open(root: &Path, experiment: &str) -> Result<Self, TrainingError> {
        if experiment.trim().is_empty() || experiment.contains(['/', '\\']) {
            return Err(TrainingError::Tracking(format!(
                "invalid experiment name '{}'",
                experiment
            )));
        }

        let start_time = Utc::now();
        let suffix: u32 = rand::thread_rng().gen();
        let run_id = format!("{}-{:08x}", start_time.format("%Y%m%dT%H%M%S%.3fZ"), suffix);
        let run_dir = root.join(experiment).join(&run_id);
        std::fs::create_dir_all(run_dir.join(ARTIFACTS_DIR))?;

        let session = Self {
            run_dir,
            record: RunRecord {
                experiment: experiment.to_string(),
                run_id,
                status: RunStatus::Running,
                start_time,
                end_time: None,
                tags: BTreeMap::new(),
                params: BTreeMap::new(),
                metrics: BTreeMap::new(),
                artifacts: Vec::new(),
            },
            closed: false,
        };
        session.flush()?;
        info!(
            experiment,
            run_id = %session.record.run_id,
            "Tracking session opened"
        );
        Ok(session)
    }

    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn set_tag(&mut self, key: &str, value: impl ToString) {
        self.record.tags.insert(key.to_string(), value.to_string());
    }

    pub fn log_param(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        debug!(key, value = %value, "log_param");
        self.record.params.insert(key.to_string(), value);
    }

    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<(), TrainingError> {
        if !value.is_finite() {
            return Err(TrainingError::Tracking(format!(
                "metric '{}' is not finite: {}",
                key, value
            )));
        }
        debug!(key, value, "log_metric");
        self.record.metrics.insert(key.to_string(), value);
        Ok(())
    }

    /// Сохраняет значение как JSON-артефакт `artifacts/<name>.json`
    pub fn log_artifact_json<T: Serialize>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, TrainingError> {
        let file_name = format!("{}.json", name);
        let path = self.run_dir.join(ARTIFACTS_DIR).join(&file_name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        self.record.artifacts.push(file_name);
        Ok(path)
    }

    /// Копирует существующий файл в артефакты запуска
    pub fn log_artifact_file(&mut self, source: &Path) -> Result<PathBuf, TrainingError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| {
                TrainingError::Tracking(format!("'{}' is not a file", source.display()))
            })?
            .to_string_lossy()
            .into_owned();
        let path = self.run_dir.join(ARTIFACTS_DIR).join(&file_name);
        std::fs::copy(source, &path)?;
        self.record.artifacts.push(file_name);
        Ok(path)
    }

    /// Прикладывает обработанную таблицу и файл ее параметров, если он есть
    pub fn log_processed_table(&mut self, output: &Path) -> Result<Vec<PathBuf>, TrainingError> {
        let mut logged = vec![self.log_artifact_file(output)?];
        let params = params_path(output);
        if params.is_file() {
            logged.push(self.log_artifact_file(&params)?);
        }
        Ok(logged)
    }

    /// Успешное завершение запуска
    pub fn finish(mut self) -> Result<RunRecord, TrainingError> {
        self.close(RunStatus::Finished)?;
        info!(run_id = %self.record.run_id, "Tracking session finished");
        Ok(self.record.clone())
    }

    fn close(&mut self, status: RunStatus) -> Result<(), TrainingError> {
        self.closed = true;
        self.record.status = status;
        self.record.end_time = Some(Utc::now());
        self.flush()
    }

    fn flush(&self) -> Result<(), TrainingError> {
        let json = serde_json::to_string_pretty(&self.record)?;
        std::fs::write(self.run_dir.join(RUN_FILE), json)?;
        Ok(())
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(
            run_id = %self.record.run_id,
            "Tracking session dropped without finish - marking as failed"
        );
        if let Err(e) = self.close(RunStatus::Failed) {
            warn!(error = %e, "Failed to record run status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = TrackingSession::open(dir.path(), "iris").unwrap();
        session.set_tag("model_type", "decision tree");
        session.log_param("tuning_cv", 5);
        session.log_metric("accuracy", 0.95).unwrap();
        session.log_artifact_json("summary", &vec![1, 2, 3]).unwrap();
        let run_dir = session.run_dir().to_path_buf();

        let record = session.finish().unwrap();
        assert_eq!(record.status, RunStatus::Finished);

        let stored = RunRecord::load(&run_dir).unwrap();
        assert_eq!(stored, record);
        assert_eq!(stored.params.get("tuning_cv").map(String::as_str), Some("5"));
        assert_eq!(stored.metrics.get("accuracy"), Some(&0.95));
        assert!(run_dir.join("artifacts/summary.json").is_file());
        assert!(stored.end_time.is_some());
    }

    #[test]
    fn test_drop_without_finish_marks_failed() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = {
            let mut session = TrackingSession::open(dir.path(), "iris").unwrap();
            session.log_param("seed", 42);
            session.run_dir().to_path_buf()
        };
        let stored = RunRecord::load(&run_dir).unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.params.get("seed").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_non_finite_metric_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = TrackingSession::open(dir.path(), "iris").unwrap();
        assert!(session.log_metric("loss", f64::NAN).is_err());
        session.finish().unwrap();
    }

    #[test]
    fn test_invalid_experiment_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TrackingSession::open(dir.path(), "a/b").is_err());
        assert!(TrackingSession::open(dir.path(), " ").is_err());
    }

    #[test]
    fn test_processed_table_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("processed.csv");
        std::fs::write(&table, "x,Species\n0.5,1\n").unwrap();
        std::fs::write(params_path(&table), "{}").unwrap();

        let mut session = TrackingSession::open(&dir.path().join("mlruns"), "iris").unwrap();
        let logged = session.log_processed_table(&table).unwrap();
        let run_dir = session.run_dir().to_path_buf();
        let record = session.finish().unwrap();

        assert_eq!(logged.len(), 2);
        assert_eq!(
            std::fs::read_to_string(run_dir.join("artifacts/processed.csv")).unwrap(),
            "x,Species\n0.5,1\n"
        );
        assert!(run_dir.join("artifacts/processed.csv.params.json").is_file());
        assert_eq!(record.artifacts, vec!["processed.csv", "processed.csv.params.json"]);
    }

    #[test]
    fn test_missing_artifact_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = TrackingSession::open(dir.path(), "iris").unwrap();
        assert!(session.log_artifact_file(&dir.path().join("absent.csv")).is_err());
        assert!(session.log_processed_table(&dir.path().join("absent.csv")).is_err());
        session.finish().unwrap();
    }
}

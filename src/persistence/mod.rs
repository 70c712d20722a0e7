//! CSV Persistence Module
//!
//! Append-only storage of evaluated signals for offline analysis.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::info;

/// One row per evaluated signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub timestamp: i64,
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub action: String,
    pub adjusted_confidence: f64,
    pub bias: f64,
    pub weight: f64,
    pub risk_allocation: f64,
    pub regime_label: String,
    pub sentiment_value: f64,
    pub reward: i8,
    pub success: bool,
}

/// Append-only sink for evaluation records
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn append(&self, record: &EvaluationRecord) -> Result<()>;
}

/// CSV persistence manager
pub struct CsvPersistence {
    data_dir: PathBuf,
    evaluation_writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
}

impl CsvPersistence {
    /// Create a new CSV persistence manager
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);

        fs::create_dir_all(data_dir.join("evaluations"))
            .context("Failed to create evaluations directory")?;

        let today = Utc::now().format("%Y-%m-%d");
        let evaluation_writer = Self::create_writer(
            &data_dir.join("evaluations"),
            &format!("evaluations_{}.csv", today),
        )?;

        info!(data_dir = %data_dir.display(), "CSV persistence ready");

        Ok(Self {
            data_dir,
            evaluation_writer: Arc::new(AsyncRwLock::new(evaluation_writer)),
        })
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    /// Save an evaluation record
    pub async fn save_evaluation(&self, record: &EvaluationRecord) -> Result<()> {
        let mut writer = self.evaluation_writer.write().await;
        writer
            .serialize(record)
            .context("Failed to write evaluation record")?;
        writer
            .flush()
            .context("Failed to flush evaluation writer")?;
        Ok(())
    }

    /// Load evaluation history for the last `days` days (today included)
    pub fn load_evaluation_history(&self, days: u32) -> Result<Vec<EvaluationRecord>> {
        let mut records = Vec::new();

        for i in (0..days).rev() {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let filename = format!("evaluations_{}.csv", date.format("%Y-%m-%d"));
            let path = self.data_dir.join("evaluations").join(&filename);

            if path.exists() {
                let file = std::fs::File::open(&path).context("Failed to open evaluation file")?;
                let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

                for result in reader.deserialize() {
                    let record: EvaluationRecord =
                        result.context("Failed to deserialize evaluation record")?;
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[async_trait]
impl RecordSink for CsvPersistence {
    async fn append(&self, record: &EvaluationRecord) -> Result<()> {
        self.save_evaluation(record).await
    }
}

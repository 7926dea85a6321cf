//! Per-epoch training logs.
//!
//! Recognised lines (whitespace separated, other lines ignored):
//! - `train_loss <loss> train_acc <acc> ...`
//! - `test_loss <loss> test_acc <acc> ...`
//! - `total ...` with the epoch time in seconds as the sixth token.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    TrainLoss,
    TrainAcc,
    TestLoss,
    TestAcc,
    EpochTime,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::TrainLoss => "train loss",
            Metric::TrainAcc => "train accuracy",
            Metric::TestLoss => "test loss",
            Metric::TestAcc => "test accuracy",
            Metric::EpochTime => "epoch time (s)",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingLog {
    pub train_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub test_loss: Vec<f64>,
    pub test_acc: Vec<f64>,
    pub epoch_time: Vec<f64>,
}

impl TrainingLog {
    pub fn from_path(path: &Path) -> LogResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| LogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text, path)
    }

    /// Parses log text; `origin` only labels errors.
    pub fn parse_str(text: &str, origin: &Path) -> LogResult<Self> {
        let mut log = TrainingLog::default();
        for (idx, line) in text.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let field = |pos: usize| number_at(&tokens, pos, origin, idx + 1);
            if line.starts_with("train_loss") {
                log.train_loss.push(field(1)?);
                log.train_acc.push(field(3)?);
            } else if line.starts_with("test_loss") {
                log.test_loss.push(field(1)?);
                log.test_acc.push(field(3)?);
            } else if line.starts_with("total") {
                log.epoch_time.push(field(5)?);
            }
        }
        Ok(log)
    }

    pub fn series(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::TrainLoss => &self.train_loss,
            Metric::TrainAcc => &self.train_acc,
            Metric::TestLoss => &self.test_loss,
            Metric::TestAcc => &self.test_acc,
            Metric::EpochTime => &self.epoch_time,
        }
    }

    pub fn mean_epoch_time(&self) -> Option<f64> {
        mean(&self.epoch_time)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn number_at(tokens: &[&str], pos: usize, origin: &Path, line: usize) -> LogResult<f64> {
    let malformed = |msg: String| LogError::Malformed {
        path: PathBuf::from(origin),
        line,
        msg,
    };
    let raw = tokens
        .get(pos)
        .ok_or_else(|| malformed(format!("missing token {pos}")))?;
    raw.trim_end_matches(',')
        .parse::<f64>()
        .map_err(|_| malformed(format!("token {pos} is not a number: {raw:?}")))
}

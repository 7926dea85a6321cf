//! Where each variant's training log lives.
//!
//! The baseline (`FastGRNN+Front`) is under `<root>/original/<prefix>_<number>.txt`; the other
//! eight are under `<root>/modified/<prefix>_<cell>_<position>_<number>.txt`.

use std::path::PathBuf;

use models::ModelArch;

use crate::error::LogResult;
use crate::parse::TrainingLog;

#[derive(Debug, Clone)]
pub struct LogLayout {
    pub root: PathBuf,
    pub prefix: String,
    pub number: String,
    /// Run number for the baseline log when it differs from `number`.
    pub baseline_number: Option<String>,
}

impl Default for LogLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("result/vww"),
            prefix: "150epochs".to_string(),
            number: "01".to_string(),
            baseline_number: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariantLog {
    pub arch: ModelArch,
    pub path: PathBuf,
    pub log: TrainingLog,
}

impl LogLayout {
    pub fn path_for(&self, arch: ModelArch) -> PathBuf {
        if arch.is_baseline() {
            let number = self.baseline_number.as_deref().unwrap_or(&self.number);
            self.root
                .join("original")
                .join(format!("{}_{}.txt", self.prefix, number))
        } else {
            self.root.join("modified").join(format!(
                "{}_{}_{}_{}.txt",
                self.prefix,
                arch.cell.abbr(),
                arch.position.abbr(),
                self.number
            ))
        }
    }

    /// Reads every variant that has a log, baseline first. Missing files are skipped.
    pub fn load_all(&self) -> LogResult<Vec<VariantLog>> {
        let mut logs = Vec::new();
        for arch in ModelArch::all() {
            let path = self.path_for(arch);
            if !path.is_file() {
                tracing::warn!(variant = %arch.label(), path = %path.display(), "log not found, skipping");
                continue;
            }
            let log = TrainingLog::from_path(&path)?;
            tracing::debug!(variant = %arch.label(), epochs = log.train_loss.len(), "parsed log");
            logs.push(VariantLog { arch, path, log });
        }
        Ok(logs)
    }
}

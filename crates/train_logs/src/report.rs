use std::fmt::Write as _;

use clap::ValueEnum;
use serde::Serialize;

use crate::error::LogResult;
use crate::parse::Metric;
use crate::variants::VariantLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochTimeRow {
    pub label: String,
    pub arch: String,
    pub mean_seconds: f64,
    pub epochs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub label: String,
    pub arch: String,
    pub metric: Metric,
    pub values: Vec<f64>,
}

/// Mean epoch time per variant, fastest first. Variants without timing lines are left out.
pub fn epoch_times(logs: &[VariantLog]) -> Vec<EpochTimeRow> {
    let mut rows: Vec<EpochTimeRow> = logs
        .iter()
        .filter_map(|v| {
            let Some(mean_seconds) = v.log.mean_epoch_time() else {
                tracing::warn!(variant = %v.arch.label(), "no epoch times in log");
                return None;
            };
            Some(EpochTimeRow {
                label: v.arch.label(),
                arch: v.arch.to_string(),
                mean_seconds,
                epochs: v.log.epoch_time.len(),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.mean_seconds.total_cmp(&b.mean_seconds));
    rows
}

pub fn metric_series(logs: &[VariantLog], metric: Metric) -> Vec<MetricSeries> {
    logs.iter()
        .map(|v| MetricSeries {
            label: v.arch.label(),
            arch: v.arch.to_string(),
            metric,
            values: v.log.series(metric).to_vec(),
        })
        .collect()
}

pub fn render_epoch_times(rows: &[EpochTimeRow], format: OutputFormat) -> LogResult<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(rows)?);
    }
    let width = rows.iter().map(|r| r.label.len()).max().unwrap_or(0);
    let mut out = String::from("Average time per training epoch (s)\n");
    for row in rows {
        let _ = writeln!(
            out,
            "{:<width$}  {:>10.2}  ({} epochs)",
            row.label, row.mean_seconds, row.epochs
        );
    }
    Ok(out)
}

pub fn render_series(series: &[MetricSeries], format: OutputFormat) -> LogResult<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(series)?);
    }
    let mut out = String::new();
    for s in series {
        let values: Vec<String> = s.values.iter().map(|v| format!("{v:.4}")).collect();
        let last = s
            .values
            .last()
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{} [{}] {} epochs, last {}",
            s.label,
            s.metric.label(),
            s.values.len(),
            last
        );
        let _ = writeln!(out, "  {}", values.join(" "));
    }
    Ok(out)
}

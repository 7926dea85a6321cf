use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use train_logs::{
    epoch_times, metric_series, render_epoch_times, render_series, LogLayout, Metric, OutputFormat,
};

#[derive(Parser, Debug)]
#[command(
    name = "vww-report",
    about = "Compare training logs of the nine RNNPool VWW variants"
)]
struct Args {
    /// Directory holding original/ and modified/ log folders.
    #[arg(long, default_value = "result/vww")]
    root: PathBuf,
    /// Log file prefix, e.g. 150epochs.
    #[arg(long, default_value = "150epochs")]
    prefix: String,
    /// Run number suffix of the log files.
    #[arg(long, default_value = "01")]
    number: String,
    /// Run number of the baseline log, when it differs from --number.
    #[arg(long)]
    baseline_number: Option<String>,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mean time per training epoch, fastest variant first.
    EpochTime,
    /// Per-epoch series of one metric for every variant.
    Curves {
        #[arg(long, value_enum, default_value_t = Metric::TrainLoss)]
        metric: Metric,
    },
}

fn main() -> anyhow::Result<()> {
    train_logs::init_tracing();
    let args = Args::parse();
    let layout = LogLayout {
        root: args.root,
        prefix: args.prefix,
        number: args.number,
        baseline_number: args.baseline_number,
    };
    let logs = layout
        .load_all()
        .with_context(|| format!("reading logs under {}", layout.root.display()))?;
    if logs.is_empty() {
        anyhow::bail!("no training logs found under {}", layout.root.display());
    }

    let out = match args.command {
        Command::EpochTime => render_epoch_times(&epoch_times(&logs), args.format)?,
        Command::Curves { metric } => render_series(&metric_series(&logs, metric), args.format)?,
    };
    println!("{}", out.trim_end());
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use run_tracker::metrics::{format_duration, format_pace};
use run_tracker::replay::{load_log, replay};
use run_tracker::TrackerConfig;

#[derive(Parser, Debug)]
#[command(name = "run_tracker")]
#[command(about = "Replay a recorded run log and print the run summary", long_about = None)]
struct Args {
    /// Path to a run log (.json or .json.gz)
    #[arg(value_name = "LOG")]
    log: PathBuf,

    /// Tracker config (JSON); defaults apply to missing keys
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override runner weight used for calories
    #[arg(long)]
    weight_kg: Option<f64>,

    /// Write the summary here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(weight) = args.weight_kg {
        config.metrics.weight_kg = weight;
        config.validate()?;
    }

    let log = load_log(&args.log).with_context(|| format!("reading run log {}", args.log.display()))?;
    log::info!("Replaying {} events from {}", log.events.len(), args.log.display());

    let (result, stats) = replay(&log, &config)?;
    log::info!(
        "{} fixes, {} accel samples, {} updates, {} rejected controls",
        stats.fixes,
        stats.accel_samples,
        stats.updates,
        stats.rejected_controls
    );
    log::info!(
        "{:.2} km in {} ({} /km), {} steps, {} kcal",
        result.total_distance_meters / 1000.0,
        format_duration(result.duration_seconds),
        format_pace(result.pace_min_per_km),
        result.step_count,
        result.calories_kcal
    );

    let json = result.to_json()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            log::info!("Summary written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

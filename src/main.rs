use anyhow::Context;
use lane_tuner::detector::BrightRegionDetector;
use lane_tuner::report::CsvReport;
use lane_tuner::scoring::{JitterScorer, OverlapScorer, Scorer};
use lane_tuner::sources::ImageSequenceSource;
use lane_tuner::{FrameSource, TuningConfig, TuningController, TuningOutcome};
use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LANE_TUNER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn tune<S: Scorer>(
    config: &TuningConfig,
    sources: Vec<Box<dyn FrameSource>>,
    scorer: S,
    report: CsvReport<BufWriter<File>>,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<TuningOutcome> {
    let mut controller = TuningController::new(config, sources, scorer, report)?.with_stop_flag(stop);
    Ok(controller.run()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // --- 1. Argument Parsing ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        println!("Usage: lane_tuner <config.json> <results.csv> <frames_dir>...");
        return Ok(());
    }
    let config_path = &args[1];
    let results_path = &args[2];

    // --- 2. Configuration & Sources ---
    let config = TuningConfig::from_json_file(config_path)
        .with_context(|| format!("failed to load tuning config from {config_path}"))?;
    config.validate().context("invalid tuning config")?;

    let mut sources: Vec<Box<dyn FrameSource>> = Vec::new();
    for dir in &args[3..] {
        let source =
            ImageSequenceSource::open(dir).with_context(|| format!("failed to open image sequence {dir}"))?;
        sources.push(Box::new(source));
    }

    let file = File::create(results_path).with_context(|| format!("failed to create {results_path}"))?;
    let report = CsvReport::new(BufWriter::new(file));

    // --- 3. Stop on Ctrl-C ---
    // The trial in progress completes, then every parameter keeps its best value.
    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current trial");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    // --- 4. Tuning ---
    info!(config = %config_path, results = %results_path, sources = sources.len(), "starting tuning run");
    let outcome = tokio::task::spawn_blocking(move || {
        let detector = BrightRegionDetector::default();
        match config.reference() {
            Some(reference) => tune(&config, sources, OverlapScorer::new(detector, reference), report, stop),
            None => {
                let scorer = JitterScorer::with_history(detector, config.jitter_history);
                tune(&config, sources, scorer, report, stop)
            }
        }
    })
    .await
    .context("tuning task panicked")??;

    // --- 5. Summary ---
    if outcome.stopped {
        println!("Tuning stopped early after {} trials.", outcome.trials);
    } else {
        println!("Tuning finished after {} trials.", outcome.trials);
    }
    for (name, value) in &outcome.values {
        println!("  {name} = {value:.4}");
    }
    println!("  score = {:.4}", outcome.score);
    Ok(())
}

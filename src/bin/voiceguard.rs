use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use voiceguard_rs::training::{
    discover_audio, train_to_dir, AudioEntry, ClassificationMetrics, TrainingCorpus,
    TrainingOptions, TrainingReport,
};
use voiceguard_rs::{
    load_waveform, DetectorConfig, FeatureExtractor, FraudRiskAssessment, Label, RiskConfig,
    TranscriptAnalysis, VoiceAnalysis, VoiceDetector, VoiceDetectorBuilder,
};

#[path = "voiceguard/json_report_formatter.rs"]
mod json_report_formatter;

#[derive(Debug, Parser)]
#[command(name = "voiceguard")]
#[command(about = "Train and run the synthetic voice detector")]
struct Cli {
    /// Detector config JSON (feature and risk parameters).
    #[arg(long, global = true, env = "VOICEGUARD_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, global = true, env = "VOICEGUARD_DEVICE", default_value = "cpu")]
    device: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract features from a labelled corpus and train a model artifact.
    Train(TrainArgs),
    /// Score a trained artifact against a labelled test corpus.
    Evaluate(EvaluateArgs),
    /// Classify one recording, optionally scoring a call transcript.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
struct TrainArgs {
    #[arg(long, env = "VOICEGUARD_DATA_DIR", default_value = "data/train")]
    data_dir: PathBuf,
    #[arg(long, env = "VOICEGUARD_MODEL_DIR", default_value = "models/voiceguard")]
    out: PathBuf,
    /// JSONL feature cache; read when present, written after extraction.
    #[arg(long, env = "VOICEGUARD_FEATURE_CACHE")]
    feature_cache: Option<PathBuf>,
    /// Ignore an existing feature cache and re-extract.
    #[arg(long, default_value_t = false)]
    refresh_cache: bool,
    #[arg(long, env = "VOICEGUARD_EPOCHS", default_value_t = 50)]
    epochs: usize,
    #[arg(long, env = "VOICEGUARD_BATCH_SIZE", default_value_t = 32)]
    batch_size: usize,
    #[arg(long, env = "VOICEGUARD_LEARNING_RATE", default_value_t = 1e-3)]
    learning_rate: f64,
    #[arg(long, env = "VOICEGUARD_VALIDATION_FRACTION", default_value_t = 0.2)]
    validation_fraction: f32,
    #[arg(long, env = "VOICEGUARD_SEED", default_value_t = 42)]
    seed: u64,
    #[arg(long, env = "VOICEGUARD_DROPOUT", default_value_t = 0.3)]
    dropout: f32,
    #[arg(long, env = "VOICEGUARD_EARLY_STOP_PATIENCE")]
    early_stop_patience: Option<usize>,
    /// Training report JSON path.
    #[arg(long, env = "VOICEGUARD_REPORT_OUT")]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct EvaluateArgs {
    #[arg(long, env = "VOICEGUARD_MODEL_DIR", default_value = "models/voiceguard")]
    model_dir: PathBuf,
    #[arg(long, env = "VOICEGUARD_TEST_DIR", default_value = "data/test")]
    data_dir: PathBuf,
    #[arg(long, env = "VOICEGUARD_REPORT_OUT")]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(long, env = "VOICEGUARD_MODEL_DIR", default_value = "models/voiceguard")]
    model_dir: PathBuf,
    #[arg(long)]
    audio: PathBuf,
    /// Call transcript; enables fraud risk scoring.
    #[arg(long)]
    transcript: Option<String>,
    /// Risk weights and lexicon JSON, overriding the detector config.
    #[arg(long, env = "VOICEGUARD_RISK_CONFIG")]
    risk_config: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TrainCommandReport {
    generated_at: DateTime<Utc>,
    data_dir: PathBuf,
    model_dir: PathBuf,
    options: TrainingOptions,
    skipped_files: usize,
    elapsed_secs: f64,
    training: TrainingReport,
}

#[derive(Debug, Serialize)]
struct FileOutcome {
    path: PathBuf,
    language: String,
    expected: Label,
    predicted: Option<Label>,
    confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EvaluationReport {
    generated_at: DateTime<Utc>,
    model_dir: PathBuf,
    pair_id: Option<String>,
    data_dir: PathBuf,
    failures: usize,
    macro_f1: f32,
    metrics: ClassificationMetrics,
    files: Vec<FileOutcome>,
}

#[derive(Debug, Serialize)]
struct AnalyzeReport {
    generated_at: DateTime<Utc>,
    audio: PathBuf,
    pair_id: Option<String>,
    voice: VoiceAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<TranscriptAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    risk: Option<FraudRiskAssessment>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voiceguard_rs=info,voiceguard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), &cli.device)?;
    match cli.command {
        Command::Train(args) => run_train(args, config),
        Command::Evaluate(args) => run_evaluate(args, config),
        Command::Analyze(args) => run_analyze(args, config),
    }
}

fn load_config(path: Option<&Path>, device: &str) -> Result<DetectorConfig, String> {
    let mut config = match path {
        Some(path) => DetectorConfig::load(path)
            .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))?,
        None => DetectorConfig::default(),
    };
    config.device = device.to_string();
    Ok(config)
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    progress
}

fn file_label(entry: &AudioEntry) -> String {
    entry
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run_train(args: TrainArgs, config: DetectorConfig) -> Result<(), String> {
    let started = Instant::now();
    let options = TrainingOptions {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        validation_fraction: args.validation_fraction,
        seed: args.seed,
        dropout: args.dropout,
        early_stop_patience: args.early_stop_patience,
        device: config.device.clone(),
    };
    options.validate().map_err(|err| err.to_string())?;

    let cached = args
        .feature_cache
        .as_ref()
        .filter(|path| path.exists() && !args.refresh_cache);
    let (corpus, skipped_files) = if let Some(path) = cached {
        let corpus = TrainingCorpus::read_cache(path, &config.feature).map_err(|err| {
            format!(
                "Failed to read feature cache '{}': {err} (pass --refresh-cache to rebuild)",
                path.display()
            )
        })?;
        tracing::info!(path = %path.display(), rows = corpus.len(), "using feature cache");
        (corpus, 0)
    } else {
        let extractor = FeatureExtractor::new(config.feature.clone()).map_err(|err| err.to_string())?;
        let entries = discover_audio(&args.data_dir).map_err(|err| err.to_string())?;
        if entries.is_empty() {
            return Err(format!(
                "No .wav or .flac files found under '{}'.",
                args.data_dir.display()
            ));
        }
        let progress = progress_bar(entries.len());
        progress.set_message("extracting features");
        let corpus = TrainingCorpus::extract(&entries, &extractor, |entry| {
            progress.set_message(file_label(entry));
            progress.inc(1);
        });
        progress.finish_with_message("features extracted");
        let skipped = entries.len() - corpus.len();
        if let Some(path) = args.feature_cache.as_ref() {
            corpus
                .write_cache(path)
                .map_err(|err| format!("Failed to write feature cache '{}': {err}", path.display()))?;
        }
        (corpus, skipped)
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("training on {} samples", corpus.len()));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    let training = train_to_dir(&corpus, &options, &args.out);
    spinner.finish_and_clear();
    let training = training.map_err(|err| format!("Training failed: {err}"))?;

    eprintln!(
        "best epoch {} validation accuracy {:.3} -> {}",
        training.best_epoch,
        training.best_validation.accuracy,
        args.out.display()
    );
    let report = TrainCommandReport {
        generated_at: Utc::now(),
        data_dir: args.data_dir,
        model_dir: args.out,
        options,
        skipped_files,
        elapsed_secs: started.elapsed().as_secs_f64(),
        training,
    };
    match args.report.as_ref() {
        Some(path) => json_report_formatter::write_report(path, &report),
        None => Ok(()),
    }
}

fn build_detector(mut config: DetectorConfig, model_dir: &Path) -> Result<VoiceDetector, String> {
    config.model_dir = model_dir.to_string_lossy().into_owned();
    VoiceDetectorBuilder::new(config)
        .build()
        .map_err(|err| format!("Failed to load model '{}': {err}", model_dir.display()))
}

fn run_evaluate(args: EvaluateArgs, config: DetectorConfig) -> Result<(), String> {
    let detector = build_detector(config, &args.model_dir)?;
    let entries = discover_audio(&args.data_dir).map_err(|err| err.to_string())?;
    if entries.is_empty() {
        return Err(format!(
            "No .wav or .flac files found under '{}'.",
            args.data_dir.display()
        ));
    }

    let progress = progress_bar(entries.len());
    let mut files = Vec::with_capacity(entries.len());
    for entry in &entries {
        progress.set_message(file_label(entry));
        let result = load_waveform(&entry.path).and_then(|w| detector.classify(&w));
        files.push(match result {
            Ok(result) => FileOutcome {
                path: entry.path.clone(),
                language: entry.language.clone(),
                expected: entry.label,
                predicted: Some(result.label),
                confidence: Some(result.confidence),
                error: None,
            },
            Err(err) => {
                tracing::warn!(path = %entry.path.display(), error = %err, "evaluation file failed");
                FileOutcome {
                    path: entry.path.clone(),
                    language: entry.language.clone(),
                    expected: entry.label,
                    predicted: None,
                    confidence: None,
                    error: Some(err.to_string()),
                }
            }
        });
        progress.inc(1);
    }
    progress.finish_with_message("done");

    let metrics = ClassificationMetrics::from_predictions(
        files
            .iter()
            .filter_map(|f| f.predicted.map(|p| (f.expected, p))),
    );
    for class in &metrics.per_class {
        eprintln!(
            "{:<13} precision {:.3} recall {:.3} f1 {:.3} support {}",
            class.label.as_str(),
            class.precision,
            class.recall,
            class.f1,
            class.support
        );
    }
    eprintln!(
        "accuracy {:.3} macro f1 {:.3} over {} files",
        metrics.accuracy,
        metrics.macro_f1(),
        metrics.total
    );

    let report = EvaluationReport {
        generated_at: Utc::now(),
        model_dir: args.model_dir,
        pair_id: detector.pair_id().map(str::to_string),
        data_dir: args.data_dir,
        failures: files.iter().filter(|f| f.error.is_some()).count(),
        macro_f1: metrics.macro_f1(),
        metrics,
        files,
    };
    match args.out.as_ref() {
        Some(path) => json_report_formatter::write_report(path, &report),
        None => json_report_formatter::print_report(&report),
    }
}

fn run_analyze(args: AnalyzeArgs, mut config: DetectorConfig) -> Result<(), String> {
    if let Some(path) = args.risk_config.as_ref() {
        config.risk = RiskConfig::load(path)
            .map_err(|err| format!("Failed to load risk config '{}': {err}", path.display()))?;
    }
    let detector = build_detector(config, &args.model_dir)?;
    let waveform = load_waveform(&args.audio).map_err(|err| err.to_string())?;

    let (voice, transcript, risk) = match args.transcript.as_deref() {
        Some(text) => {
            let call = detector
                .analyze_call(&waveform, text)
                .map_err(|err| format!("Analysis failed: {err}"))?;
            (call.voice, Some(call.transcript), Some(call.risk))
        }
        None => {
            let voice = detector
                .analyze(&waveform)
                .map_err(|err| format!("Analysis failed: {err}"))?;
            (voice, None, None)
        }
    };

    let report = AnalyzeReport {
        generated_at: Utc::now(),
        audio: args.audio,
        pair_id: detector.pair_id().map(str::to_string),
        voice,
        transcript,
        risk,
    };
    match args.out.as_ref() {
        Some(path) => json_report_formatter::write_report(path, &report),
        None => json_report_formatter::print_report(&report),
    }
}

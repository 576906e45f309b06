use std::f32::consts::PI;
use std::path::PathBuf;

use libtest_mimic::{Arguments, Failed, Trial};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voiceguard_rs::artifact::new_pair_id;
use voiceguard_rs::config::RiskThresholds;
use voiceguard_rs::features::layout::{PITCH_MEAN, VOICED_RATIO};
use voiceguard_rs::risk::assess_risk;
use voiceguard_rs::training::{train, LabelledSample, TrainingCorpus, TrainingOptions};
use voiceguard_rs::{
    ClassificationResult, DetectorConfig, DetectorError, FeatureConfig, FeatureExtractor,
    FeatureScaler, FeatureVector, Label, RiskConfig, RiskLevel, TranscriptAnalysis,
    VoiceClassifier, VoiceDetectorBuilder, Waveform, FEATURE_DIM,
};

const SUITE_NAME: &str = "detection_scenarios";
const SAMPLE_RATE: f32 = 16_000.0;

fn main() {
    let args = Arguments::from_args();
    let tests = vec![
        trial("feature_vector_is_fixed_and_deterministic", feature_vector_is_fixed_and_deterministic),
        trial("five_seconds_of_silence_is_degenerate_not_an_error", silence_is_degenerate),
        trial("waveform_shorter_than_one_frame_is_rejected", short_waveform_is_rejected),
        trial("scaler_zeroes_training_mean", scaler_zeroes_training_mean),
        trial("separable_corpus_reaches_full_validation_accuracy", separable_corpus_trains),
        trial("saved_artifact_round_trips_through_detector", artifact_round_trip_is_deterministic),
        trial("probabilities_sum_to_one", probabilities_sum_to_one),
        trial("detector_refuses_artifact_from_other_feature_settings", feature_settings_drift_is_rejected),
        trial("human_call_scores_lower_than_synthetic_call", human_scores_lower_than_synthetic),
        trial("risk_is_monotonic_in_ai_probability", risk_is_monotonic),
        trial("risk_thresholds_cover_every_score", thresholds_are_total),
    ];
    libtest_mimic::run(&args, tests).exit();
}

fn trial(name: &str, f: fn() -> Result<(), String>) -> Trial {
    Trial::test(format!("{SUITE_NAME}::{name}"), move || f().map_err(Failed::from))
}

fn check(cond: bool, message: impl Into<String>) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(message.into())
    }
}

/// Harmonic "voice" with optional vibrato and breath noise.
fn voice(secs: f32, f0: f32, vibrato_hz: f32, noise: f32, seed: u64) -> Waveform {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (secs * SAMPLE_RATE) as usize;
    let mut phase = 0.0f32;
    let samples = (0..n)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            let f = f0 * (1.0 + 0.06 * (2.0 * PI * vibrato_hz * t).sin());
            phase += 2.0 * PI * f / SAMPLE_RATE;
            let harmonics = (1..=4)
                .map(|h| (phase * h as f32).sin() / h as f32)
                .sum::<f32>();
            0.3 * harmonics + noise * rng.random_range(-1.0f32..1.0)
        })
        .collect();
    Waveform::from_mono(16_000, samples).expect("synthetic voice is a valid waveform")
}

fn extractor() -> Result<FeatureExtractor, String> {
    FeatureExtractor::new(FeatureConfig::default()).map_err(|e| e.to_string())
}

fn temp_model_dir(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("voiceguard-scenario-{name}-{}", new_pair_id()))
        .join("model")
}

fn feature_vector_is_fixed_and_deterministic() -> Result<(), String> {
    let extractor = extractor()?;
    let wf = voice(2.0, 160.0, 5.0, 0.02, 1);
    let a = extractor.extract(&wf).map_err(|e| e.to_string())?;
    let b = extractor.extract(&wf).map_err(|e| e.to_string())?;
    check(a.as_slice().len() == FEATURE_DIM, "feature vector has wrong length")?;
    check(a.is_finite(), "feature vector has non-finite values")?;
    check(a == b, "repeated extraction differs")?;
    check(a.get(VOICED_RATIO) > 0.5, format!("voiced ratio {}", a.get(VOICED_RATIO)))?;
    let pitch = a.get(PITCH_MEAN);
    check(
        (140.0..185.0).contains(&pitch),
        format!("pitch mean {pitch} is far from 160 Hz"),
    )
}

fn silence_is_degenerate() -> Result<(), String> {
    let wf = Waveform::from_mono(16_000, vec![0.0; 5 * 16_000]).map_err(|e| e.to_string())?;
    let features = extractor()?.extract(&wf).map_err(|e| e.to_string())?;
    check(features.is_finite(), "silence produced non-finite features")?;
    check(
        features.get(VOICED_RATIO) == 0.0,
        "silence reported voiced frames",
    )
}

fn short_waveform_is_rejected() -> Result<(), String> {
    let wf = Waveform::from_mono(16_000, vec![0.2; 1000]).map_err(|e| e.to_string())?;
    match extractor()?.extract(&wf) {
        Err(DetectorError::InsufficientAudio {
            samples: 1000,
            required,
        }) if required > 1000 => Ok(()),
        other => Err(format!("expected InsufficientAudio, got {other:?}")),
    }
}

fn scaler_zeroes_training_mean() -> Result<(), String> {
    let mut rng = StdRng::seed_from_u64(9);
    let rows: Vec<FeatureVector> = (0..12)
        .map(|_| {
            let values: Vec<f32> = (0..FEATURE_DIM)
                .map(|i| i as f32 + rng.random_range(-5.0f32..5.0))
                .collect();
            FeatureVector::try_from(values).map_err(|e| e.to_string())
        })
        .collect::<Result<_, _>>()?;
    let mut scaler = FeatureScaler::new();
    scaler.fit(&rows, "scenario").map_err(|e| e.to_string())?;
    let scaled = scaler.transform_batch(&rows).map_err(|e| e.to_string())?;
    for dim in 0..FEATURE_DIM {
        let mean = scaled.iter().map(|r| r.get(dim) as f64).sum::<f64>() / scaled.len() as f64;
        check(mean.abs() < 1e-4, format!("dimension {dim} mean {mean}"))?;
    }
    Ok(())
}

fn separable_rows(per_class: usize, seed: u64) -> Result<TrainingCorpus, String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::new();
    for label in Label::ALL {
        let centre = if label == Label::AiGenerated { 2.0 } else { -2.0 };
        for _ in 0..per_class {
            let row = (0..FEATURE_DIM)
                .map(|_| centre + rng.random_range(-0.5f32..0.5))
                .collect();
            rows.push((row, label));
        }
    }
    TrainingCorpus::from_rows(rows).map_err(|e| e.to_string())
}

fn separable_corpus_trains() -> Result<(), String> {
    let corpus = separable_rows(10, 21)?;
    let options = TrainingOptions {
        epochs: 20,
        batch_size: 8,
        ..TrainingOptions::default()
    };
    let model = train(&corpus, &options).map_err(|e| e.to_string())?;
    let report = model.report();
    check(
        report.best_validation.accuracy == 1.0,
        format!("validation accuracy {}", report.best_validation.accuracy),
    )?;
    check(
        report.history.len() == 20,
        "training without patience ran fewer epochs",
    )?;
    check(
        report.history[report.best_epoch - 1].validation_accuracy == 1.0,
        "best epoch does not carry the reported accuracy",
    )
}

fn artifact_round_trip_is_deterministic() -> Result<(), String> {
    let extractor = extractor()?;
    let mut samples = Vec::new();
    for i in 0..4u64 {
        // Flat, clean tones stand in for synthetic speech.
        let ai = voice(0.5, 120.0 + 10.0 * i as f32, 0.0, 0.0, i);
        let human = voice(0.5, 180.0 + 10.0 * i as f32, 5.0, 0.05, 100 + i);
        for (wf, label) in [(ai, Label::AiGenerated), (human, Label::Human)] {
            samples.push(LabelledSample {
                features: extractor.extract(&wf).map_err(|e| e.to_string())?,
                label,
                language: "en".to_string(),
            });
        }
    }
    let corpus = TrainingCorpus::new(samples);
    let options = TrainingOptions {
        epochs: 5,
        batch_size: 4,
        ..TrainingOptions::default()
    };
    let model = train(&corpus, &options).map_err(|e| e.to_string())?;
    let dir = temp_model_dir("round-trip");
    model.save(&dir).map_err(|e| e.to_string())?;
    let pair_id = model.pair_id().to_string();
    let (in_memory, scaler) = model.into_pair();

    let config = DetectorConfig {
        model_dir: dir.to_string_lossy().into_owned(),
        ..DetectorConfig::default()
    };
    let detector = VoiceDetectorBuilder::new(config)
        .build()
        .map_err(|e| e.to_string())?;
    check(
        detector.pair_id() == Some(pair_id.as_str()),
        "loaded detector has a different pair id",
    )?;

    let clip = voice(1.0, 150.0, 3.0, 0.01, 77);
    let first = detector.classify(&clip).map_err(|e| e.to_string())?;
    let second = detector.classify(&clip).map_err(|e| e.to_string())?;
    check(first == second, "repeated classification differs")?;

    let features = extractor.extract(&clip).map_err(|e| e.to_string())?;
    let scaled = scaler.transform(&features).map_err(|e| e.to_string())?;
    let expected = in_memory.predict(&scaled).map_err(|e| e.to_string())?;
    check(
        expected == first,
        format!("in-memory {expected:?} differs from loaded {first:?}"),
    )?;

    if let Some(root) = dir.parent() {
        let _ = std::fs::remove_dir_all(root);
    }
    Ok(())
}

fn feature_settings_drift_is_rejected() -> Result<(), String> {
    let model = train(
        &separable_rows(4, 8)?,
        &TrainingOptions {
            epochs: 2,
            batch_size: 4,
            ..TrainingOptions::default()
        },
    )
    .map_err(|e| e.to_string())?;
    let dir = temp_model_dir("drift");
    model.save(&dir).map_err(|e| e.to_string())?;

    let drifted = DetectorConfig {
        model_dir: dir.to_string_lossy().into_owned(),
        feature: FeatureConfig {
            n_fft: 512,
            hop_length: 128,
            ..FeatureConfig::default()
        },
        ..DetectorConfig::default()
    };
    let outcome = VoiceDetectorBuilder::new(drifted.clone()).build();
    let matching = VoiceDetectorBuilder::new(DetectorConfig {
        feature: FeatureConfig::default(),
        ..drifted
    })
    .build();
    if let Some(root) = dir.parent() {
        let _ = std::fs::remove_dir_all(root);
    }

    match outcome {
        Err(DetectorError::Configuration { .. }) => {}
        Err(other) => return Err(format!("expected a configuration error, got {other}")),
        Ok(_) => return Err("detector accepted an artifact trained with other feature settings".into()),
    }
    matching
        .map(|_| ())
        .map_err(|e| format!("matching settings were rejected: {e}"))
}

fn probabilities_sum_to_one() -> Result<(), String> {
    let model = train(
        &separable_rows(4, 5)?,
        &TrainingOptions {
            epochs: 2,
            batch_size: 4,
            ..TrainingOptions::default()
        },
    )
    .map_err(|e| e.to_string())?;
    let (classifier, _) = model.into_pair();
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..20 {
        let scale = rng.random_range(0.1f32..50.0);
        let values: Vec<f32> = (0..FEATURE_DIM)
            .map(|_| scale * rng.random_range(-1.0f32..1.0))
            .collect();
        let row = FeatureVector::try_from(values).map_err(|e| e.to_string())?;
        let result = classifier.predict(&row).map_err(|e| e.to_string())?;
        let sum = result.probabilities.ai_generated + result.probabilities.human;
        check((sum - 1.0).abs() < 1e-5, format!("probabilities sum to {sum}"))?;
        check(
            result.confidence >= 0.5 && result.confidence <= 1.0,
            format!("confidence {}", result.confidence),
        )?;
    }
    Ok(())
}

fn urgent_transcript() -> TranscriptAnalysis {
    TranscriptAnalysis {
        transcript: "This is urgent, you must pay immediately".to_string(),
        matched_keywords: vec!["urgent".to_string(), "immediately".to_string()],
    }
}

fn human_scores_lower_than_synthetic() -> Result<(), String> {
    let config = RiskConfig::default();
    let transcript = urgent_transcript();
    let human = assess_risk(
        &config,
        &ClassificationResult::from_probabilities([0.05, 0.95]),
        &transcript,
    );
    let synthetic = assess_risk(
        &config,
        &ClassificationResult::from_probabilities([0.95, 0.05]),
        &transcript,
    );
    check(
        human.risk_level < synthetic.risk_level,
        format!("{:?} is not below {:?}", human.risk_level, synthetic.risk_level),
    )?;
    check(human.risk_level == RiskLevel::Medium, format!("human {human:?}"))?;
    check(
        synthetic.risk_level == RiskLevel::Critical,
        format!("synthetic {synthetic:?}"),
    )
}

fn risk_is_monotonic() -> Result<(), String> {
    let config = RiskConfig::default();
    for transcript in [TranscriptAnalysis::default(), urgent_transcript()] {
        let (mut previous, mut previous_ai) = (0u8, 0u8);
        for step in 0..=100 {
            let p = step as f32 / 100.0;
            let risk = assess_risk(
                &config,
                &ClassificationResult::from_probabilities([p, 1.0 - p]),
                &transcript,
            );
            check(
                risk.risk_score >= previous,
                format!("score fell from {previous} to {} at p={p}", risk.risk_score),
            )?;
            check(
                risk.ai_detection_score >= previous_ai,
                format!(
                    "ai score fell from {previous_ai} to {} at p={p}",
                    risk.ai_detection_score
                ),
            )?;
            previous = risk.risk_score;
            previous_ai = risk.ai_detection_score;
        }
        check(previous_ai == 100, format!("ai score at p=1 is {previous_ai}"))?;
    }
    Ok(())
}

fn thresholds_are_total() -> Result<(), String> {
    let thresholds = RiskThresholds::default();
    let mut previous = RiskLevel::Low;
    for score in 0..=100u8 {
        let level = thresholds.level(score);
        check(level >= previous, format!("level dropped at {score}"))?;
        previous = level;
    }
    check(thresholds.level(0) == RiskLevel::Low, "0 is not LOW")?;
    check(thresholds.level(100) == RiskLevel::Critical, "100 is not CRITICAL")
}

use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::{
    new_pair_id, write_artifact, ArtifactManifest, TrainingLock, ARTIFACT_FORMAT_VERSION,
};
use crate::config::FeatureConfig;
use crate::error::DetectorError;
use crate::features::{FeatureVector, FEATURE_DIM, FEATURE_LAYOUT_VERSION};
use crate::model::classifier_net::VoiceClassifierNet;
use crate::model::{ClassifierArchitecture, FeatureScaler};
use crate::pipeline::model_runtime::{select_device, CandleClassifier};
use crate::training::corpus::{LabelledSample, TrainingCorpus};
use crate::training::metrics::ClassificationMetrics;
use crate::types::{ClassificationResult, Label};

/// Majority-class share above which the corpus is reported as imbalanced.
const IMBALANCE_WARN_SHARE: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_fraction: f32,
    pub seed: u64,
    pub dropout: f32,
    /// Stop after this many epochs without a better validation accuracy.
    pub early_stop_patience: Option<usize>,
    pub device: String,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_fraction: 0.2,
            seed: 42,
            dropout: 0.3,
            early_stop_patience: None,
            device: "cpu".to_string(),
        }
    }
}

impl TrainingOptions {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(DetectorError::configuration(
                "epochs and batch_size must be positive",
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(DetectorError::configuration(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.early_stop_patience == Some(0) {
            return Err(DetectorError::configuration(
                "early_stop_patience must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f32,
    pub validation_accuracy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub pair_id: String,
    pub best_epoch: usize,
    pub best_validation: ClassificationMetrics,
    pub history: Vec<EpochSummary>,
    /// Whole-corpus counts, indexed by [`Label::index`].
    pub class_counts: [usize; Label::COUNT],
    pub train_samples: usize,
    pub validation_samples: usize,
}

/// Weights restored to the best validation epoch, with the scaler fitted on
/// the same run's training partition.
pub struct TrainedModel {
    varmap: VarMap,
    net: VoiceClassifierNet,
    device: Device,
    scaler: FeatureScaler,
    architecture: ClassifierArchitecture,
    feature: FeatureConfig,
    report: TrainingReport,
}

impl TrainedModel {
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    pub fn pair_id(&self) -> &str {
        &self.report.pair_id
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    /// Extractor settings the training rows were produced with.
    pub fn feature_config(&self) -> &FeatureConfig {
        &self.feature
    }

    /// Writes the artifact while holding the directory's training lock.
    pub fn save(&self, dir: &Path) -> Result<(), DetectorError> {
        let _lock = TrainingLock::acquire(dir)?;
        self.write_to(dir)
    }

    fn write_to(&self, dir: &Path) -> Result<(), DetectorError> {
        let scaler = self.scaler.state().ok_or_else(|| {
            DetectorError::configuration("trained model is missing its scaler statistics")
        })?;
        let manifest = ArtifactManifest {
            format_version: ARTIFACT_FORMAT_VERSION,
            pair_id: self.report.pair_id.clone(),
            feature_dim: FEATURE_DIM,
            layout_version: FEATURE_LAYOUT_VERSION,
            feature: self.feature.clone(),
            architecture: self.architecture.clone(),
            labels: Label::ALL.to_vec(),
            created_at: Utc::now(),
            best_epoch: self.report.best_epoch,
            validation_accuracy: self.report.best_validation.accuracy,
        };
        write_artifact(dir, &manifest, scaler, |path| {
            self.varmap
                .save(path)
                .map_err(|e| DetectorError::runtime("save model weights", e))
        })
    }

    /// Splits into the two halves a detector is built from.
    pub fn into_pair(self) -> (CandleClassifier, FeatureScaler) {
        let classifier =
            CandleClassifier::from_parts(self.net, self.device, Some(self.report.pair_id));
        (classifier, self.scaler)
    }
}

/// Trains with the directory lock held from the first epoch until the artifact
/// is published.
pub fn train_to_dir(
    corpus: &TrainingCorpus,
    options: &TrainingOptions,
    dir: &Path,
) -> Result<TrainingReport, DetectorError> {
    let _lock = TrainingLock::acquire(dir)?;
    let model = train(corpus, options)?;
    model.write_to(dir)?;
    Ok(model.report)
}

pub fn train(
    corpus: &TrainingCorpus,
    options: &TrainingOptions,
) -> Result<TrainedModel, DetectorError> {
    options.validate()?;
    let architecture = ClassifierArchitecture {
        dropout: options.dropout,
        ..ClassifierArchitecture::default()
    };
    architecture.validate()?;

    let split = corpus.split(options.validation_fraction, options.seed)?;
    let class_counts = corpus.class_counts();
    warn_if_imbalanced(&class_counts);

    let pair_id = new_pair_id();
    let train_features: Vec<FeatureVector> =
        split.train.iter().map(|s| s.features.clone()).collect();
    let mut scaler = FeatureScaler::new();
    scaler.fit(&train_features, &pair_id)?;

    // Without a validation partition the checkpoint is chosen on training data.
    let selection: &[LabelledSample] = if split.validation.is_empty() {
        warn!("validation partition is empty; selecting the checkpoint on training data");
        &split.train
    } else {
        &split.validation
    };

    let device = select_device(&options.device)?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let net = VoiceClassifierNet::new(&architecture, vb)
        .map_err(|e| DetectorError::runtime("build classifier", e))?;

    let (train_x, train_y) = to_tensors(&split.train, &scaler, &device)?;
    let (selection_x, _) = to_tensors(selection, &scaler, &device)?;
    let selection_labels: Vec<Label> = selection.iter().map(|s| s.label).collect();

    let mut optimizer = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: options.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        },
    )
    .map_err(|e| DetectorError::runtime("create optimizer", e))?;

    info!(
        pair_id = %pair_id,
        train = split.train.len(),
        validation = split.validation.len(),
        epochs = options.epochs,
        "training started"
    );

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut order: Vec<u32> = (0..split.train.len() as u32).collect();
    let mut history = Vec::with_capacity(options.epochs);
    let mut best: Option<(usize, ClassificationMetrics, Vec<(String, Tensor)>)> = None;
    let mut stale_epochs = 0usize;

    for epoch in 1..=options.epochs {
        order.shuffle(&mut rng);
        let mut loss_sum = 0.0f32;
        let mut batches = 0usize;
        for chunk in order.chunks(options.batch_size) {
            let loss = (|| -> candle_core::Result<f32> {
                let idx = Tensor::from_slice(chunk, chunk.len(), &device)?;
                let xs = train_x.index_select(&idx, 0)?;
                let ys = train_y.index_select(&idx, 0)?;
                let logits = net.forward_t(&xs, true)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &ys)?;
                optimizer.backward_step(&loss)?;
                loss.to_scalar::<f32>()
            })()
            .map_err(|e| DetectorError::runtime("training step", e))?;
            loss_sum += loss;
            batches += 1;
        }
        let train_loss = loss_sum / batches.max(1) as f32;

        let metrics = evaluate(&net, &selection_x, &selection_labels)?;
        history.push(EpochSummary {
            epoch,
            train_loss,
            validation_accuracy: metrics.accuracy,
        });
        info!(
            epoch,
            train_loss,
            validation_accuracy = metrics.accuracy,
            "epoch finished"
        );

        let improved = best
            .as_ref()
            .map_or(true, |(_, prev, _)| metrics.accuracy > prev.accuracy);
        if improved {
            debug!(epoch, accuracy = metrics.accuracy, "new best checkpoint");
            best = Some((epoch, metrics, snapshot(&varmap)?));
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
            if options.early_stop_patience.is_some_and(|p| stale_epochs >= p) {
                info!(epoch, stale_epochs, "early stopping");
                break;
            }
        }
    }

    let (best_epoch, best_validation, weights) = best.ok_or_else(|| {
        DetectorError::runtime("training", "no epoch completed")
    })?;
    restore(&varmap, &weights)?;
    info!(
        best_epoch,
        validation_accuracy = best_validation.accuracy,
        "restored best checkpoint"
    );

    Ok(TrainedModel {
        varmap,
        net,
        device,
        scaler,
        architecture,
        feature: corpus.feature_config().clone(),
        report: TrainingReport {
            pair_id,
            best_epoch,
            best_validation,
            history,
            class_counts,
            train_samples: split.train.len(),
            validation_samples: split.validation.len(),
        },
    })
}

fn warn_if_imbalanced(counts: &[usize; Label::COUNT]) {
    let total: usize = counts.iter().sum();
    let majority = counts.iter().copied().max().unwrap_or(0);
    if total > 0 && majority as f32 / total as f32 > IMBALANCE_WARN_SHARE {
        warn!(
            ai_generated = counts[Label::AiGenerated.index()],
            human = counts[Label::Human.index()],
            "corpus is severely imbalanced"
        );
    }
}

fn to_tensors(
    samples: &[LabelledSample],
    scaler: &FeatureScaler,
    device: &Device,
) -> Result<(Tensor, Tensor), DetectorError> {
    let mut flat = Vec::with_capacity(samples.len() * FEATURE_DIM);
    for sample in samples {
        flat.extend_from_slice(scaler.transform(&sample.features)?.as_slice());
    }
    let labels: Vec<u32> = samples.iter().map(|s| s.label.index() as u32).collect();
    let xs = Tensor::from_vec(flat, (samples.len(), FEATURE_DIM), device)
        .map_err(|e| DetectorError::runtime("tensor creation", e))?;
    let ys = Tensor::from_vec(labels, samples.len(), device)
        .map_err(|e| DetectorError::runtime("tensor creation", e))?;
    Ok((xs, ys))
}

/// Inference-mode metrics using the same argmax rule as prediction.
fn evaluate(
    net: &VoiceClassifierNet,
    xs: &Tensor,
    labels: &[Label],
) -> Result<ClassificationMetrics, DetectorError> {
    if labels.is_empty() {
        return Ok(ClassificationMetrics::from_predictions(std::iter::empty()));
    }
    let probs = net
        .forward_t(xs, false)
        .and_then(|logits| candle_nn::ops::softmax(&logits, D::Minus1))
        .and_then(|p| p.to_vec2::<f32>())
        .map_err(|e| DetectorError::runtime("validation forward", e))?;
    let predicted = probs.iter().map(|row| {
        let pair = [row[0], row[1]];
        ClassificationResult::from_probabilities(pair).label
    });
    Ok(ClassificationMetrics::from_predictions(
        labels.iter().copied().zip(predicted),
    ))
}

fn snapshot(varmap: &VarMap) -> Result<Vec<(String, Tensor)>, DetectorError> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| DetectorError::runtime("snapshot weights", e))?;
    data.iter()
        .map(|(name, var)| {
            // `copy` allocates fresh storage; optimizer steps update vars in place.
            let tensor = var
                .as_tensor()
                .copy()
                .map(|t| t.detach())
                .map_err(|e| DetectorError::runtime("snapshot weights", e))?;
            Ok((name.clone(), tensor))
        })
        .collect()
}

fn restore(varmap: &VarMap, weights: &[(String, Tensor)]) -> Result<(), DetectorError> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| DetectorError::runtime("restore weights", e))?;
    for (name, tensor) in weights {
        let var = data.get(name).ok_or_else(|| {
            DetectorError::runtime("restore weights", format!("missing variable {name}"))
        })?;
        var.set(tensor)
            .map_err(|e| DetectorError::runtime("restore weights", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    use crate::pipeline::traits::VoiceClassifier;

    fn separable(per_class: usize, seed: u64) -> TrainingCorpus {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::new();
        for label in Label::ALL {
            let centre = if label == Label::AiGenerated { 1.0 } else { -1.0 };
            for _ in 0..per_class {
                let row = (0..FEATURE_DIM)
                    .map(|_| centre + rng.random_range(-0.3f32..0.3))
                    .collect();
                rows.push((row, label));
            }
        }
        TrainingCorpus::from_rows(rows).unwrap()
    }

    fn quick() -> TrainingOptions {
        TrainingOptions {
            epochs: 8,
            batch_size: 4,
            ..TrainingOptions::default()
        }
    }

    #[test]
    fn rejects_bad_options() {
        let opts = TrainingOptions {
            batch_size: 0,
            ..TrainingOptions::default()
        };
        assert!(opts.validate().is_err());
        let opts = TrainingOptions {
            early_stop_patience: Some(0),
            ..TrainingOptions::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn best_epoch_is_first_strict_maximum() {
        let model = train(&separable(6, 3), &quick()).unwrap();
        let report = model.report();
        let best = report
            .history
            .iter()
            .map(|h| h.validation_accuracy)
            .fold(f32::MIN, f32::max);
        let first = report
            .history
            .iter()
            .find(|h| h.validation_accuracy == best)
            .unwrap();
        assert_eq!(report.best_epoch, first.epoch);
        assert_eq!(report.best_validation.accuracy, best);
    }

    #[test]
    fn restored_weights_reproduce_best_accuracy() {
        let corpus = separable(6, 11);
        let model = train(&corpus, &quick()).unwrap();
        let expected = model.report().best_validation.accuracy;
        let split = corpus.split(0.2, 42).unwrap();
        let (classifier, scaler) = model.into_pair();
        let correct = split
            .validation
            .iter()
            .filter(|s| {
                let scaled = scaler.transform(&s.features).unwrap();
                classifier.predict(&scaled).unwrap().label == s.label
            })
            .count();
        assert_eq!(correct as f32 / split.validation.len() as f32, expected);
    }

    #[test]
    fn early_stopping_cuts_history() {
        let opts = TrainingOptions {
            epochs: 40,
            early_stop_patience: Some(2),
            ..quick()
        };
        let model = train(&separable(6, 5), &opts).unwrap();
        let report = model.report();
        assert!(report.history.len() <= report.best_epoch + 2);
    }

    #[test]
    fn saved_manifest_records_corpus_feature_settings() {
        let feature = FeatureConfig {
            n_fft: 1024,
            ..FeatureConfig::default()
        };
        let corpus = separable(4, 7).with_feature_config(feature.clone());
        let opts = TrainingOptions {
            epochs: 2,
            ..quick()
        };
        let model = train(&corpus, &opts).unwrap();
        assert_eq!(model.feature_config(), &feature);

        let root = std::env::temp_dir().join(format!("voiceguard-trainer-{}", new_pair_id()));
        let dir = root.join("model");
        model.save(&dir).unwrap();
        let manifest = crate::artifact::load_artifact(&dir).unwrap().manifest;
        assert_eq!(manifest.feature, feature);
        assert_eq!(manifest.pair_id, model.pair_id());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn single_class_corpus_fails_fast() {
        let rows = vec![(vec![0.0; FEATURE_DIM], Label::Human); 4];
        let corpus = TrainingCorpus::from_rows(rows).unwrap();
        assert!(matches!(
            train(&corpus, &quick()),
            Err(DetectorError::Corpus { .. })
        ));
    }
}

use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;

use crate::artifact::ModelArtifact;
use crate::error::DetectorError;
use crate::features::{FeatureVector, FEATURE_DIM};
use crate::model::classifier_net::VoiceClassifierNet;
use crate::pipeline::traits::VoiceClassifier;
use crate::types::{ClassificationResult, Label};

pub(crate) fn select_device(device: &str) -> Result<Device, DetectorError> {
    match device {
        "cuda" => Device::new_cuda(0).map_err(|e| DetectorError::runtime("CUDA init", e)),
        "metal" => Device::new_metal(0).map_err(|e| DetectorError::runtime("Metal init", e)),
        "" | "cpu" => Ok(Device::Cpu),
        other => Err(DetectorError::configuration(format!(
            "unknown device '{other}', expected cpu, cuda or metal"
        ))),
    }
}

/// Candle MLP classifier; immutable after construction.
pub struct CandleClassifier {
    net: VoiceClassifierNet,
    device: Device,
    pair_id: Option<String>,
}

impl CandleClassifier {
    pub fn from_artifact(artifact: &ModelArtifact, device: &str) -> Result<Self, DetectorError> {
        let device = select_device(device)?;
        let vb =
            VarBuilder::from_buffered_safetensors(artifact.weights.clone(), DType::F32, &device)
                .map_err(|e| DetectorError::configuration(format!("load model weights: {e}")))?;
        // Shape mismatches between manifest and weights surface here.
        let net = VoiceClassifierNet::new(&artifact.manifest.architecture, vb).map_err(|e| {
            DetectorError::configuration(format!("model weights do not match architecture: {e}"))
        })?;

        tracing::info!(
            pair_id = %artifact.manifest.pair_id,
            hidden = ?artifact.manifest.architecture.hidden,
            ?device,
            "voice classifier loaded"
        );
        Ok(Self {
            net,
            device,
            pair_id: Some(artifact.manifest.pair_id.clone()),
        })
    }

    pub(crate) fn from_parts(
        net: VoiceClassifierNet,
        device: Device,
        pair_id: Option<String>,
    ) -> Self {
        Self {
            net,
            device,
            pair_id,
        }
    }

    fn probabilities(
        &self,
        rows: &[FeatureVector],
    ) -> Result<Vec<[f32; Label::COUNT]>, DetectorError> {
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.as_slice().iter().copied()).collect();
        let xs = Tensor::from_vec(flat, (rows.len(), FEATURE_DIM), &self.device)
            .map_err(|e| DetectorError::runtime("tensor creation", e))?;
        let logits = self
            .net
            .forward_t(&xs, false)
            .map_err(|e| DetectorError::runtime("forward pass", e))?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(|e| DetectorError::runtime("softmax", e))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(raw) = logits.to_vec2::<f32>() {
                tracing::debug!(logits = ?raw, "classifier logits");
            }
        }
        probs
            .into_iter()
            .map(|row| {
                <[f32; Label::COUNT]>::try_from(row.as_slice()).map_err(|_| {
                    DetectorError::runtime(
                        "softmax",
                        format!("expected {} classes, got {}", Label::COUNT, row.len()),
                    )
                })
            })
            .collect()
    }
}

impl VoiceClassifier for CandleClassifier {
    fn predict(&self, scaled: &FeatureVector) -> Result<ClassificationResult, DetectorError> {
        let probs = self.probabilities(std::slice::from_ref(scaled))?;
        probs
            .first()
            .map(|p| ClassificationResult::from_probabilities(*p))
            .ok_or_else(|| DetectorError::runtime("predict", "empty model output"))
    }

    fn predict_batch(
        &self,
        scaled: &[FeatureVector],
    ) -> Result<Vec<ClassificationResult>, DetectorError> {
        if scaled.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .probabilities(scaled)?
            .into_iter()
            .map(ClassificationResult::from_probabilities)
            .collect())
    }

    fn pair_id(&self) -> Option<&str> {
        self.pair_id.as_deref()
    }

    fn device_label(&self) -> String {
        format!("candle:{:?}", self.device).to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    use crate::model::ClassifierArchitecture;

    fn random_classifier() -> CandleClassifier {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let net = VoiceClassifierNet::new(&ClassifierArchitecture::default(), vb).unwrap();
        CandleClassifier::from_parts(net, Device::Cpu, None)
    }

    #[test]
    fn probabilities_sum_to_one() {
        let classifier = random_classifier();
        for value in [-3.0, 0.0, 0.5, 10.0] {
            let result = classifier.predict(&FeatureVector::filled(value)).unwrap();
            let sum = result.probabilities.ai_generated + result.probabilities.human;
            assert!((sum - 1.0).abs() < 1e-5, "sum {sum}");
            assert!((0.0..=1.0).contains(&result.confidence));
            assert!(result.confidence >= 0.5);
        }
    }

    #[test]
    fn batch_matches_single_predictions() {
        let classifier = random_classifier();
        let rows = vec![FeatureVector::filled(0.1), FeatureVector::filled(-0.7)];
        let batch = classifier.predict_batch(&rows).unwrap();
        for (row, b) in rows.iter().zip(&batch) {
            let single = classifier.predict(row).unwrap();
            assert_eq!(single.label, b.label);
            assert!((single.confidence - b.confidence).abs() < 1e-5);
        }
    }

    #[test]
    fn unknown_device_is_configuration_error() {
        assert!(matches!(
            select_device("tpu"),
            Err(DetectorError::Configuration { .. })
        ));
        assert!(select_device("cpu").is_ok());
    }
}

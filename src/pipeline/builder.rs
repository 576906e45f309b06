use std::path::Path;

use crate::artifact::{load_artifact, ModelArtifact};
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::features::FeatureExtractor;
use crate::model::FeatureScaler;
use crate::pipeline::defaults::{LexiconKeywordMatcher, WeightedRiskScorer};
use crate::pipeline::model_runtime::CandleClassifier;
use crate::pipeline::runtime::{VoiceDetector, VoiceDetectorParts};
use crate::pipeline::traits::{KeywordMatcher, RiskScorer, VoiceClassifier};
use crate::types::Waveform;

pub struct VoiceDetectorBuilder {
    config: DetectorConfig,
    classifier: Option<Box<dyn VoiceClassifier>>,
    scaler: Option<FeatureScaler>,
    keyword_matcher: Option<Box<dyn KeywordMatcher>>,
    risk_scorer: Option<Box<dyn RiskScorer>>,
}

impl VoiceDetectorBuilder {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            classifier: None,
            scaler: None,
            keyword_matcher: None,
            risk_scorer: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn VoiceClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_scaler(mut self, scaler: FeatureScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_keyword_matcher(mut self, keyword_matcher: Box<dyn KeywordMatcher>) -> Self {
        self.keyword_matcher = Some(keyword_matcher);
        self
    }

    pub fn with_risk_scorer(mut self, risk_scorer: Box<dyn RiskScorer>) -> Self {
        self.risk_scorer = Some(risk_scorer);
        self
    }

    pub fn build(self) -> Result<VoiceDetector, DetectorError> {
        let expected_sample_rate_hz = if self.config.expected_sample_rate_hz == 0 {
            DetectorConfig::DEFAULT_SAMPLE_RATE_HZ
        } else {
            self.config.expected_sample_rate_hz
        };
        if expected_sample_rate_hz != Waveform::SAMPLE_RATE_HZ {
            return Err(DetectorError::configuration(format!(
                "feature extraction is defined at {} Hz, config asks for {expected_sample_rate_hz} Hz",
                Waveform::SAMPLE_RATE_HZ
            )));
        }
        let extractor = FeatureExtractor::new(self.config.feature.clone())?;

        // The artifact is only read when a half of the pair was not supplied.
        let (classifier, scaler) = match (self.classifier, self.scaler) {
            (Some(classifier), Some(scaler)) => (classifier, scaler),
            (classifier, scaler) => {
                let artifact = load_configured_artifact(&self.config)?;
                artifact.manifest.check_feature_config(&self.config.feature)?;
                let classifier: Box<dyn VoiceClassifier> = match classifier {
                    Some(classifier) => classifier,
                    None => Box::new(CandleClassifier::from_artifact(
                        &artifact,
                        &self.config.device,
                    )?),
                };
                let scaler = match scaler {
                    Some(scaler) => scaler,
                    None => FeatureScaler::from_state(artifact.scaler)?,
                };
                (classifier, scaler)
            }
        };
        let pair_id = check_pair(&scaler, classifier.as_ref())?;

        let keyword_matcher = match self.keyword_matcher {
            Some(matcher) => matcher,
            None => Box::new(LexiconKeywordMatcher::new(&self.config.risk)?),
        };
        let risk_scorer = match self.risk_scorer {
            Some(scorer) => scorer,
            None => Box::new(WeightedRiskScorer::new(self.config.risk)?),
        };

        tracing::info!(
            pair_id = pair_id.as_deref().unwrap_or("unpaired"),
            device = %classifier.device_label(),
            "voice detector ready"
        );
        Ok(VoiceDetector::from_parts(VoiceDetectorParts {
            extractor,
            scaler,
            classifier,
            keyword_matcher,
            risk_scorer,
            pair_id,
        }))
    }
}

fn load_configured_artifact(config: &DetectorConfig) -> Result<ModelArtifact, DetectorError> {
    if config.model_dir.is_empty() {
        return Err(DetectorError::configuration(
            "no trained model supplied and model_dir is empty",
        ));
    }
    load_artifact(Path::new(&config.model_dir))
}

/// Refuses a scaler and classifier stamped by different training runs.
fn check_pair(
    scaler: &FeatureScaler,
    classifier: &dyn VoiceClassifier,
) -> Result<Option<String>, DetectorError> {
    if !scaler.is_fitted() {
        return Err(DetectorError::configuration(
            "feature scaler has not been fitted",
        ));
    }
    match (scaler.pair_id(), classifier.pair_id()) {
        (Some(s), Some(c)) if s != c => Err(DetectorError::configuration(format!(
            "scaler pair id {s} does not match classifier pair id {c}"
        ))),
        (s, c) => Ok(c.or(s).map(str::to_string)),
    }
}

use crate::error::DetectorError;
use crate::features::FeatureVector;
use crate::types::{ClassificationResult, FraudRiskAssessment, TranscriptAnalysis};

/// Classifies already-scaled feature vectors. Implementations must not mutate
/// state in `predict`; one instance is shared across threads.
pub trait VoiceClassifier: Send + Sync {
    fn predict(&self, scaled: &FeatureVector) -> Result<ClassificationResult, DetectorError>;

    fn predict_batch(
        &self,
        scaled: &[FeatureVector],
    ) -> Result<Vec<ClassificationResult>, DetectorError> {
        scaled.iter().map(|row| self.predict(row)).collect()
    }

    /// Training run this classifier came from, if it was loaded from an artifact.
    fn pair_id(&self) -> Option<&str> {
        None
    }

    fn device_label(&self) -> String;
}

pub trait KeywordMatcher: Send + Sync {
    fn analyze(&self, transcript: &str) -> TranscriptAnalysis;
}

pub trait RiskScorer: Send + Sync {
    fn score(
        &self,
        classification: &ClassificationResult,
        transcript: &TranscriptAnalysis,
    ) -> FraudRiskAssessment;
}

use crate::error::DetectorError;
use crate::features::{FeatureExtractor, FeatureVector};
use crate::model::FeatureScaler;
use crate::pipeline::explain::explain;
use crate::pipeline::traits::{KeywordMatcher, RiskScorer, VoiceClassifier};
use crate::types::{
    CallAnalysis, ClassificationResult, FraudRiskAssessment, TranscriptAnalysis, VoiceAnalysis,
    Waveform,
};

/// A matched (scaler, classifier) pair plus the risk side of call analysis.
/// Immutable once built; share it as `Arc<VoiceDetector>`.
pub struct VoiceDetector {
    extractor: FeatureExtractor,
    scaler: FeatureScaler,
    classifier: Box<dyn VoiceClassifier>,
    keyword_matcher: Box<dyn KeywordMatcher>,
    risk_scorer: Box<dyn RiskScorer>,
    pair_id: Option<String>,
}

pub(crate) struct VoiceDetectorParts {
    pub extractor: FeatureExtractor,
    pub scaler: FeatureScaler,
    pub classifier: Box<dyn VoiceClassifier>,
    pub keyword_matcher: Box<dyn KeywordMatcher>,
    pub risk_scorer: Box<dyn RiskScorer>,
    pub pair_id: Option<String>,
}

impl VoiceDetector {
    pub(crate) fn from_parts(parts: VoiceDetectorParts) -> Self {
        Self {
            extractor: parts.extractor,
            scaler: parts.scaler,
            classifier: parts.classifier,
            keyword_matcher: parts.keyword_matcher,
            risk_scorer: parts.risk_scorer,
            pair_id: parts.pair_id,
        }
    }

    pub fn pair_id(&self) -> Option<&str> {
        self.pair_id.as_deref()
    }

    pub fn device_label(&self) -> String {
        self.classifier.device_label()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn extract_features(&self, waveform: &Waveform) -> Result<FeatureVector, DetectorError> {
        self.extractor.extract(waveform)
    }

    /// Scales raw features with the paired scaler and runs the classifier.
    pub fn classify_features(
        &self,
        features: &FeatureVector,
    ) -> Result<ClassificationResult, DetectorError> {
        let scaled = self.scaler.transform(features)?;
        self.classifier.predict(&scaled)
    }

    pub fn classify(&self, waveform: &Waveform) -> Result<ClassificationResult, DetectorError> {
        let features = self.extract_features(waveform)?;
        self.classify_features(&features)
    }

    pub fn analyze(&self, waveform: &Waveform) -> Result<VoiceAnalysis, DetectorError> {
        let features = self.extract_features(waveform)?;
        let classification = self.classify_features(&features)?;
        tracing::debug!(
            label = %classification.label,
            confidence = classification.confidence,
            duration_secs = waveform.duration_secs(),
            "voice classified"
        );
        Ok(VoiceAnalysis {
            explanation: explain(&features, &classification),
            classification,
            duration_secs: waveform.duration_secs(),
        })
    }

    /// Each waveform runs the single-sample pipeline on its own; one failure
    /// does not abort the rest.
    pub fn classify_batch(
        &self,
        waveforms: &[Waveform],
    ) -> Vec<Result<ClassificationResult, DetectorError>> {
        waveforms.iter().map(|w| self.classify(w)).collect()
    }

    pub fn analyze_transcript(&self, transcript: &str) -> TranscriptAnalysis {
        self.keyword_matcher.analyze(transcript)
    }

    pub fn assess_risk(
        &self,
        classification: &ClassificationResult,
        transcript: &TranscriptAnalysis,
    ) -> FraudRiskAssessment {
        self.risk_scorer.score(classification, transcript)
    }

    pub fn analyze_call(
        &self,
        waveform: &Waveform,
        transcript: &str,
    ) -> Result<CallAnalysis, DetectorError> {
        let voice = self.analyze(waveform)?;
        let transcript = self.analyze_transcript(transcript);
        let risk = self.assess_risk(&voice.classification, &transcript);
        if !risk.alerts.is_empty() {
            tracing::info!(
                risk_score = risk.risk_score,
                risk_level = risk.risk_level.as_str(),
                alerts = risk.alerts.len(),
                "call risk assessed"
            );
        }
        Ok(CallAnalysis {
            voice,
            transcript,
            risk,
        })
    }
}

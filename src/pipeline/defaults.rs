use crate::config::RiskConfig;
use crate::error::DetectorError;
use crate::pipeline::traits::{KeywordMatcher, RiskScorer};
use crate::risk::{assess_risk, KeywordLexicon};
use crate::types::{ClassificationResult, FraudRiskAssessment, TranscriptAnalysis};

pub struct LexiconKeywordMatcher {
    lexicon: KeywordLexicon,
}

impl LexiconKeywordMatcher {
    pub fn new(config: &RiskConfig) -> Result<Self, DetectorError> {
        let lexicon = KeywordLexicon::new(&config.lexicon)?;
        if lexicon.is_empty() {
            tracing::warn!("keyword lexicon is empty; transcripts will never match");
        } else {
            tracing::debug!(keywords = lexicon.len(), "compiled keyword lexicon");
        }
        Ok(Self { lexicon })
    }
}

impl KeywordMatcher for LexiconKeywordMatcher {
    fn analyze(&self, transcript: &str) -> TranscriptAnalysis {
        TranscriptAnalysis {
            transcript: transcript.to_string(),
            matched_keywords: self.lexicon.find(transcript),
        }
    }
}

pub struct WeightedRiskScorer {
    config: RiskConfig,
}

impl WeightedRiskScorer {
    pub fn new(config: RiskConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}

impl RiskScorer for WeightedRiskScorer {
    fn score(
        &self,
        classification: &ClassificationResult,
        transcript: &TranscriptAnalysis,
    ) -> FraudRiskAssessment {
        assess_risk(&self.config, classification, transcript)
    }
}

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// Canonical mono waveform at [`Waveform::SAMPLE_RATE_HZ`], at most
/// [`Waveform::MAX_DURATION_SECS`] long.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
}

impl Waveform {
    pub const SAMPLE_RATE_HZ: u32 = 16_000;
    pub const MAX_DURATION_SECS: u32 = 30;
    pub const MAX_SAMPLES: usize = (Self::SAMPLE_RATE_HZ * Self::MAX_DURATION_SECS) as usize;

    /// Wraps already-decoded mono samples. Input longer than the duration cap
    /// is truncated; any sample rate other than 16 kHz is rejected.
    pub fn from_mono(sample_rate_hz: u32, mut samples: Vec<f32>) -> Result<Self, DetectorError> {
        if sample_rate_hz != Self::SAMPLE_RATE_HZ {
            return Err(DetectorError::invalid_input(format!(
                "waveform must be {} Hz mono, got {sample_rate_hz} Hz",
                Self::SAMPLE_RATE_HZ
            )));
        }
        if let Some(idx) = samples.iter().position(|s| !s.is_finite()) {
            return Err(DetectorError::invalid_input(format!(
                "waveform contains a non-finite sample at index {idx}"
            )));
        }
        if samples.len() > Self::MAX_SAMPLES {
            tracing::debug!(
                original_samples = samples.len(),
                max_samples = Self::MAX_SAMPLES,
                "truncating waveform to duration cap"
            );
            samples.truncate(Self::MAX_SAMPLES);
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / Self::SAMPLE_RATE_HZ as f64
    }

    pub fn peak_amplitude(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    AiGenerated,
    Human,
}

impl Label {
    pub const COUNT: usize = 2;
    pub const ALL: [Label; Self::COUNT] = [Label::AiGenerated, Label::Human];

    /// Class index used by the classifier's output layer.
    pub fn index(self) -> usize {
        match self {
            Label::AiGenerated => 0,
            Label::Human => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::AiGenerated => "AI_GENERATED",
            Label::Human => "HUMAN",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    #[serde(rename = "AI_GENERATED")]
    pub ai_generated: f32,
    #[serde(rename = "HUMAN")]
    pub human: f32,
}

impl ClassProbabilities {
    pub fn from_array(probs: [f32; Label::COUNT]) -> Self {
        Self {
            ai_generated: probs[Label::AiGenerated.index()],
            human: probs[Label::Human.index()],
        }
    }

    pub fn get(&self, label: Label) -> f32 {
        match label {
            Label::AiGenerated => self.ai_generated,
            Label::Human => self.human,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    /// Probability of `label`, in [0, 1].
    pub confidence: f32,
    pub probabilities: ClassProbabilities,
}

impl ClassificationResult {
    /// Builds a result from a probability distribution; ties go to the lower class index.
    pub fn from_probabilities(probs: [f32; Label::COUNT]) -> Self {
        let mut best = 0usize;
        for (idx, &p) in probs.iter().enumerate() {
            if p > probs[best] {
                best = idx;
            }
        }
        let label = Label::from_index(best).unwrap_or(Label::AiGenerated);
        Self {
            label,
            confidence: probs[best].clamp(0.0, 1.0),
            probabilities: ClassProbabilities::from_array(probs),
        }
    }

    pub fn ai_probability(&self) -> f32 {
        self.probabilities.ai_generated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptAnalysis {
    pub transcript: String,
    /// Matched suspicious keywords, lowercase, in first-occurrence order.
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudRiskAssessment {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub ai_detection_score: u8,
    pub urgency_score: u8,
    pub keyword_score: u8,
    pub alerts: Vec<String>,
}

/// Classification plus the human-readable reasons behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceAnalysis {
    pub classification: ClassificationResult,
    pub explanation: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallAnalysis {
    pub voice: VoiceAnalysis,
    pub transcript: TranscriptAnalysis,
    pub risk: FraudRiskAssessment,
}

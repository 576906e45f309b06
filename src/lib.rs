pub mod artifact;
pub mod audio;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod risk;
pub mod training;
pub mod types;

pub use artifact::{load_artifact, ModelArtifact};
pub use audio::load_waveform;
pub use config::{DetectorConfig, FeatureConfig, RiskConfig};
pub use error::DetectorError;
pub use features::{FeatureExtractor, FeatureVector, FEATURE_DIM};
pub use model::FeatureScaler;
pub use pipeline::builder::VoiceDetectorBuilder;
pub use pipeline::runtime::VoiceDetector;
pub use pipeline::slot::DetectorSlot;
pub use pipeline::traits::{KeywordMatcher, RiskScorer, VoiceClassifier};
pub use pipeline::CandleClassifier;
pub use training::{TrainingCorpus, TrainingOptions, TrainingReport};
pub use types::{
    CallAnalysis, ClassificationResult, FraudRiskAssessment, Label, RiskLevel,
    TranscriptAnalysis, VoiceAnalysis, Waveform,
};

//! Corpus handling, metrics and the best-checkpoint training loop.

pub mod corpus;
pub mod metrics;
pub mod trainer;

pub use corpus::{discover_audio, AudioEntry, CorpusSplit, LabelledSample, TrainingCorpus};
pub use metrics::{ClassMetrics, ClassificationMetrics};
pub use trainer::{train, train_to_dir, TrainedModel, TrainingOptions, TrainingReport};

//! Labelled feature rows: discovery on disk, JSONL cache, stratified split.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::{is_supported_audio, load_waveform};
use crate::config::FeatureConfig;
use crate::error::DetectorError;
use crate::features::{FeatureExtractor, FeatureVector, FEATURE_DIM, FEATURE_LAYOUT_VERSION};
use crate::types::Label;

/// Language tag for files placed directly under a class directory.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct LabelledSample {
    pub features: FeatureVector,
    pub label: Label,
    pub language: String,
}

/// An audio file found under a corpus directory, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEntry {
    pub path: PathBuf,
    pub label: Label,
    pub language: String,
}

/// Directory name holding one class's audio.
pub fn class_dir_name(label: Label) -> &'static str {
    match label {
        Label::AiGenerated => "ai_generated",
        Label::Human => "human",
    }
}

/// Lists `<root>/{ai_generated,human}/<language>/*.{wav,flac}` in a stable order.
/// A missing class directory yields no entries for that class.
pub fn discover_audio(root: &Path) -> Result<Vec<AudioEntry>, DetectorError> {
    if !root.is_dir() {
        return Err(DetectorError::corpus(format!(
            "corpus directory {} does not exist",
            root.display()
        )));
    }
    let mut entries = Vec::new();
    for label in Label::ALL {
        let class_dir = root.join(class_dir_name(label));
        if !class_dir.is_dir() {
            warn!(dir = %class_dir.display(), "class directory missing");
            continue;
        }
        for path in sorted_children(&class_dir)? {
            if path.is_dir() {
                let language = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(UNKNOWN_LANGUAGE)
                    .to_string();
                for file in sorted_children(&path)? {
                    if file.is_file() && is_supported_audio(&file) {
                        entries.push(AudioEntry {
                            path: file,
                            label,
                            language: language.clone(),
                        });
                    }
                }
            } else if is_supported_audio(&path) {
                entries.push(AudioEntry {
                    path,
                    label,
                    language: UNKNOWN_LANGUAGE.to_string(),
                });
            }
        }
    }
    debug!(root = %root.display(), files = entries.len(), "discovered corpus audio");
    Ok(entries)
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, DetectorError> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| DetectorError::io("list corpus directory", e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

/// First line of a feature cache; rows below it are only valid under these settings.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct CacheHeader {
    layout_version: u32,
    feature_dim: usize,
    feature: FeatureConfig,
}

#[derive(Serialize, Deserialize)]
struct CachedRow {
    label: Label,
    language: String,
    features: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    samples: Vec<LabelledSample>,
    feature: FeatureConfig,
}

/// Stratified train/validation partition.
#[derive(Debug, Clone)]
pub struct CorpusSplit {
    pub train: Vec<LabelledSample>,
    pub validation: Vec<LabelledSample>,
}

impl TrainingCorpus {
    /// Rows assumed to come from the default extractor settings.
    pub fn new(samples: Vec<LabelledSample>) -> Self {
        Self {
            samples,
            feature: FeatureConfig::default(),
        }
    }

    /// Records the extractor settings the rows were produced with.
    pub fn with_feature_config(mut self, feature: FeatureConfig) -> Self {
        self.feature = feature;
        self
    }

    /// Builds a corpus from raw rows, rejecting any row that is not exactly
    /// [`FEATURE_DIM`] long.
    pub fn from_rows(rows: Vec<(Vec<f32>, Label)>) -> Result<Self, DetectorError> {
        let samples = rows
            .into_iter()
            .enumerate()
            .map(|(i, (values, label))| {
                let features = FeatureVector::try_from(values)
                    .map_err(|e| DetectorError::corpus(format!("row {i}: {e}")))?;
                Ok(LabelledSample {
                    features,
                    label,
                    language: UNKNOWN_LANGUAGE.to_string(),
                })
            })
            .collect::<Result<Vec<_>, DetectorError>>()?;
        Ok(Self::new(samples))
    }

    /// Decodes and featurizes every entry. Files that cannot be read or are
    /// too short are logged and skipped; `on_entry` is called once per entry.
    pub fn extract(
        entries: &[AudioEntry],
        extractor: &FeatureExtractor,
        mut on_entry: impl FnMut(&AudioEntry),
    ) -> Self {
        let mut samples = Vec::with_capacity(entries.len());
        for entry in entries {
            on_entry(entry);
            let features = load_waveform(&entry.path).and_then(|w| extractor.extract(&w));
            match features {
                Ok(features) => samples.push(LabelledSample {
                    features,
                    label: entry.label,
                    language: entry.language.clone(),
                }),
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "skipping corpus file");
                }
            }
        }
        Self {
            samples,
            feature: extractor.config().clone(),
        }
    }

    pub fn samples(&self) -> &[LabelledSample] {
        &self.samples
    }

    pub fn feature_config(&self) -> &FeatureConfig {
        &self.feature
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample count per class, indexed by [`Label::index`].
    pub fn class_counts(&self) -> [usize; Label::COUNT] {
        let mut counts = [0usize; Label::COUNT];
        for sample in &self.samples {
            counts[sample.label.index()] += 1;
        }
        counts
    }

    pub fn ensure_trainable(&self) -> Result<(), DetectorError> {
        let counts = self.class_counts();
        for label in Label::ALL {
            if counts[label.index()] == 0 {
                return Err(DetectorError::corpus(format!(
                    "class {label} has no samples"
                )));
            }
        }
        Ok(())
    }

    /// Seeded per-class shuffle; each class with at least two samples keeps
    /// at least one in validation and one in training.
    pub fn split(&self, validation_fraction: f32, seed: u64) -> Result<CorpusSplit, DetectorError> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(DetectorError::configuration(format!(
                "validation fraction must be in [0, 1), got {validation_fraction}"
            )));
        }
        self.ensure_trainable()?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut train = Vec::new();
        let mut validation = Vec::new();
        for label in Label::ALL {
            let mut indices: Vec<usize> = self
                .samples
                .iter()
                .enumerate()
                .filter(|(_, s)| s.label == label)
                .map(|(i, _)| i)
                .collect();
            indices.shuffle(&mut rng);

            let n = indices.len();
            let n_val = if n >= 2 {
                ((n as f32 * validation_fraction).round() as usize).clamp(1, n - 1)
            } else {
                0
            };
            for (pos, &idx) in indices.iter().enumerate() {
                let sample = self.samples[idx].clone();
                if pos < n_val {
                    validation.push(sample);
                } else {
                    train.push(sample);
                }
            }
        }
        debug!(
            train = train.len(),
            validation = validation.len(),
            seed,
            "corpus split"
        );
        Ok(CorpusSplit { train, validation })
    }

    pub fn write_cache(&self, path: &Path) -> Result<(), DetectorError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DetectorError::io("create cache dir", e))?;
        }
        let file = fs::File::create(path).map_err(|e| DetectorError::io("create feature cache", e))?;
        let mut out = BufWriter::new(file);
        let header = CacheHeader {
            layout_version: FEATURE_LAYOUT_VERSION,
            feature_dim: FEATURE_DIM,
            feature: self.feature.clone(),
        };
        serde_json::to_writer(&mut out, &header)
            .map_err(|e| DetectorError::json("serialize feature cache header", e))?;
        out.write_all(b"\n")
            .map_err(|e| DetectorError::io("write feature cache", e))?;
        for sample in &self.samples {
            let row = CachedRow {
                label: sample.label,
                language: sample.language.clone(),
                features: sample.features.to_vec(),
            };
            serde_json::to_writer(&mut out, &row)
                .map_err(|e| DetectorError::json("serialize feature cache row", e))?;
            out.write_all(b"\n")
                .map_err(|e| DetectorError::io("write feature cache", e))?;
        }
        out.flush().map_err(|e| DetectorError::io("write feature cache", e))
    }

    /// Reads a cache written by [`TrainingCorpus::write_cache`]. A cache stamped
    /// with another layout or other extractor settings is a corpus error, so
    /// stale rows are never mixed with the current extractor's output.
    pub fn read_cache(path: &Path, expected: &FeatureConfig) -> Result<Self, DetectorError> {
        let file = fs::File::open(path).map_err(|e| DetectorError::io("open feature cache", e))?;
        let mut lines = BufReader::new(file).lines().enumerate();
        let header_line = match lines.next() {
            Some((_, line)) => line.map_err(|e| DetectorError::io("read feature cache", e))?,
            None => String::new(),
        };
        let header: CacheHeader = serde_json::from_str(&header_line).map_err(|_| {
            DetectorError::corpus(format!(
                "feature cache {} has no settings header; rebuild it",
                path.display()
            ))
        })?;
        if header.layout_version != FEATURE_LAYOUT_VERSION
            || header.feature_dim != FEATURE_DIM
            || &header.feature != expected
        {
            return Err(DetectorError::corpus(format!(
                "feature cache {} is stale (layout v{}, {} dims, {:?}); rebuild it",
                path.display(),
                header.layout_version,
                header.feature_dim,
                header.feature
            )));
        }

        let mut samples = Vec::new();
        for (line_no, line) in lines {
            let line = line.map_err(|e| DetectorError::io("read feature cache", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let row: CachedRow = serde_json::from_str(&line)
                .map_err(|e| DetectorError::json("parse feature cache row", e))?;
            let features = FeatureVector::try_from(row.features).map_err(|e| {
                DetectorError::corpus(format!("feature cache line {}: {e}", line_no + 1))
            })?;
            samples.push(LabelledSample {
                features,
                label: row.label,
                language: row.language,
            });
        }
        debug!(path = %path.display(), rows = samples.len(), dim = FEATURE_DIM, "read feature cache");
        Ok(Self {
            samples,
            feature: header.feature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(ai: usize, human: usize) -> TrainingCorpus {
        let mut rows = Vec::new();
        for i in 0..ai {
            rows.push((vec![i as f32; FEATURE_DIM], Label::AiGenerated));
        }
        for i in 0..human {
            rows.push((vec![-(i as f32); FEATURE_DIM], Label::Human));
        }
        TrainingCorpus::from_rows(rows).unwrap()
    }

    #[test]
    fn ragged_rows_are_corpus_errors() {
        let rows = vec![
            (vec![0.0; FEATURE_DIM], Label::Human),
            (vec![0.0; FEATURE_DIM - 1], Label::AiGenerated),
        ];
        let err = TrainingCorpus::from_rows(rows).unwrap_err();
        assert!(matches!(err, DetectorError::Corpus { .. }));
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn empty_class_is_corpus_error() {
        let err = corpus(5, 0).split(0.2, 42).unwrap_err();
        assert!(matches!(err, DetectorError::Corpus { .. }));
    }

    #[test]
    fn split_is_stratified_and_seeded() {
        let c = corpus(10, 4);
        let a = c.split(0.2, 7).unwrap();
        let b = c.split(0.2, 7).unwrap();
        assert_eq!(a.validation.len(), 2 + 1);
        assert_eq!(a.train.len() + a.validation.len(), 14);
        for label in Label::ALL {
            assert!(a.validation.iter().any(|s| s.label == label));
            assert!(a.train.iter().any(|s| s.label == label));
        }
        let ids = |s: &CorpusSplit| {
            s.validation
                .iter()
                .map(|x| x.features.get(0))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn tiny_classes_keep_one_of_each() {
        let split = corpus(2, 2).split(0.0, 1).unwrap();
        assert_eq!(split.validation.len(), 2);
        assert_eq!(split.train.len(), 2);
    }

    #[test]
    fn cache_preserves_rows() {
        let path = std::env::temp_dir().join(format!(
            "voiceguard-cache-{}.jsonl",
            crate::artifact::new_pair_id()
        ));
        let c = corpus(2, 3);
        c.write_cache(&path).unwrap();
        let back = TrainingCorpus::read_cache(&path, &FeatureConfig::default()).unwrap();
        assert_eq!(back.samples(), c.samples());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn cache_from_other_feature_settings_is_stale() {
        let path = std::env::temp_dir().join(format!(
            "voiceguard-stalecache-{}.jsonl",
            crate::artifact::new_pair_id()
        ));
        let wide = FeatureConfig {
            n_fft: 512,
            hop_length: 128,
            ..FeatureConfig::default()
        };
        let c = corpus(2, 2).with_feature_config(wide.clone());
        c.write_cache(&path).unwrap();

        let err = TrainingCorpus::read_cache(&path, &FeatureConfig::default()).unwrap_err();
        assert!(matches!(err, DetectorError::Corpus { .. }));
        assert!(err.to_string().contains("stale"), "{err}");

        let back = TrainingCorpus::read_cache(&path, &wide).unwrap();
        assert_eq!(back.feature_config(), &wide);
        assert_eq!(back.len(), 4);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn cache_without_header_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "voiceguard-oldcache-{}.jsonl",
            crate::artifact::new_pair_id()
        ));
        let row = CachedRow {
            label: Label::Human,
            language: "en".into(),
            features: vec![0.0; FEATURE_DIM],
        };
        fs::write(&path, format!("{}\n", serde_json::to_string(&row).unwrap())).unwrap();
        let err = TrainingCorpus::read_cache(&path, &FeatureConfig::default()).unwrap_err();
        assert!(matches!(err, DetectorError::Corpus { .. }));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn short_cache_rows_are_rejected() {
        let path = std::env::temp_dir().join(format!(
            "voiceguard-badcache-{}.jsonl",
            crate::artifact::new_pair_id()
        ));
        let header = CacheHeader {
            layout_version: FEATURE_LAYOUT_VERSION,
            feature_dim: FEATURE_DIM,
            feature: FeatureConfig::default(),
        };
        fs::write(
            &path,
            format!(
                "{}\n{{\"label\":\"HUMAN\",\"language\":\"en\",\"features\":[1.0,2.0]}}\n",
                serde_json::to_string(&header).unwrap()
            ),
        )
        .unwrap();
        let err = TrainingCorpus::read_cache(&path, &FeatureConfig::default()).unwrap_err();
        assert!(matches!(err, DetectorError::Corpus { .. }));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn discovery_reads_language_dirs() {
        let root = std::env::temp_dir().join(format!(
            "voiceguard-discover-{}",
            crate::artifact::new_pair_id()
        ));
        let en = root.join("human").join("en");
        fs::create_dir_all(&en).unwrap();
        fs::create_dir_all(root.join("ai_generated")).unwrap();
        fs::write(en.join("b.wav"), b"").unwrap();
        fs::write(en.join("a.flac"), b"").unwrap();
        fs::write(en.join("notes.txt"), b"").unwrap();
        fs::write(root.join("ai_generated").join("x.wav"), b"").unwrap();

        let entries = discover_audio(&root).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| (e.label, e.language.as_str(), e.path.file_name().unwrap().to_str().unwrap()))
            .collect();
        assert_eq!(
            names,
            vec![
                (Label::AiGenerated, UNKNOWN_LANGUAGE, "x.wav"),
                (Label::Human, "en", "a.flac"),
                (Label::Human, "en", "b.wav"),
            ]
        );
        let _ = fs::remove_dir_all(&root);
    }
}

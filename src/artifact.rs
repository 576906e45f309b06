//! On-disk model artifact: a directory holding a manifest, the fitted scaler
//! and the classifier weights, all stamped with the same pair id.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FeatureConfig;
use crate::error::DetectorError;
use crate::features::{FEATURE_DIM, FEATURE_LAYOUT_VERSION};
use crate::model::{ClassifierArchitecture, ScalerState};
use crate::types::Label;

pub const ARTIFACT_FORMAT_VERSION: u32 = 2;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub pair_id: String,
    pub feature_dim: usize,
    pub layout_version: u32,
    /// Extractor settings the scaler statistics were computed under.
    pub feature: FeatureConfig,
    pub architecture: ClassifierArchitecture,
    /// Class order of the output layer.
    pub labels: Vec<Label>,
    pub created_at: DateTime<Utc>,
    pub best_epoch: usize,
    pub validation_accuracy: f32,
}

impl ArtifactManifest {
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(DetectorError::configuration(format!(
                "unsupported artifact format v{}, expected v{ARTIFACT_FORMAT_VERSION}",
                self.format_version
            )));
        }
        if self.feature_dim != FEATURE_DIM || self.layout_version != FEATURE_LAYOUT_VERSION {
            return Err(DetectorError::configuration(format!(
                "artifact expects {} features (layout v{}), extractor produces {FEATURE_DIM} (layout v{FEATURE_LAYOUT_VERSION})",
                self.feature_dim, self.layout_version
            )));
        }
        if self.labels != Label::ALL {
            return Err(DetectorError::configuration(format!(
                "artifact label order {:?} does not match {:?}",
                self.labels,
                Label::ALL
            )));
        }
        self.architecture.validate()
    }

    /// Rejects an extractor configured differently from the one used in training.
    pub fn check_feature_config(&self, feature: &FeatureConfig) -> Result<(), DetectorError> {
        if &self.feature != feature {
            return Err(DetectorError::configuration(format!(
                "artifact {} was trained with feature settings {:?}, detector is configured with {:?}",
                self.pair_id, self.feature, feature
            )));
        }
        Ok(())
    }
}

/// Everything needed to rebuild a detector from disk, already cross-checked.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub manifest: ArtifactManifest,
    pub scaler: ScalerState,
    pub weights: Vec<u8>,
}

pub fn new_pair_id() -> String {
    format!(
        "{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        rand::random::<u32>()
    )
}

pub fn load_artifact(dir: &Path) -> Result<ModelArtifact, DetectorError> {
    let manifest: ArtifactManifest = read_json(&dir.join(MANIFEST_FILE), "parse artifact manifest")?;
    manifest.validate()?;
    let scaler: ScalerState = read_json(&dir.join(SCALER_FILE), "parse scaler state")?;
    if scaler.pair_id != manifest.pair_id {
        return Err(DetectorError::configuration(format!(
            "scaler pair id {} does not match model pair id {}",
            scaler.pair_id, manifest.pair_id
        )));
    }
    let weights = fs::read(dir.join(WEIGHTS_FILE))
        .map_err(|e| DetectorError::io("read model weights", e))?;
    debug!(
        dir = %dir.display(),
        pair_id = %manifest.pair_id,
        best_epoch = manifest.best_epoch,
        "loaded model artifact"
    );
    Ok(ModelArtifact {
        manifest,
        scaler,
        weights,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
    context: &'static str,
) -> Result<T, DetectorError> {
    let data = fs::read_to_string(path).map_err(|e| DetectorError::io("read artifact file", e))?;
    serde_json::from_str(&data).map_err(|e| DetectorError::json(context, e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DetectorError> {
    let data = serde_json::to_string_pretty(value)
        .map_err(|e| DetectorError::json("serialize artifact file", e))?;
    fs::write(path, data).map_err(|e| DetectorError::io("write artifact file", e))
}

fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf, DetectorError> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DetectorError::configuration(format!("invalid model directory {}", dir.display())))?;
    let parent = dir.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{name}.{suffix}")))
}

/// Writes the three artifact files into a staging directory and swaps it into
/// place, so readers see either the previous complete pair or the new one.
pub(crate) fn write_artifact(
    dir: &Path,
    manifest: &ArtifactManifest,
    scaler: &ScalerState,
    write_weights: impl FnOnce(&Path) -> Result<(), DetectorError>,
) -> Result<(), DetectorError> {
    if scaler.pair_id != manifest.pair_id {
        return Err(DetectorError::configuration(
            "refusing to write a scaler and model from different training runs",
        ));
    }
    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DetectorError::io("create model parent dir", e))?;
    }

    let staging = sibling(dir, &format!("staging-{}", manifest.pair_id))?;
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| DetectorError::io("clear staging dir", e))?;
    }
    fs::create_dir_all(&staging).map_err(|e| DetectorError::io("create staging dir", e))?;

    let staged = (|| {
        write_weights(&staging.join(WEIGHTS_FILE))?;
        write_json(&staging.join(SCALER_FILE), scaler)?;
        // Manifest last: its presence marks the pair as complete.
        write_json(&staging.join(MANIFEST_FILE), manifest)
    })();
    if let Err(err) = staged {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }

    let previous = sibling(dir, &format!("previous-{}", manifest.pair_id))?;
    let had_previous = dir.exists();
    if had_previous {
        fs::rename(dir, &previous).map_err(|e| DetectorError::io("move previous artifact aside", e))?;
    }
    if let Err(e) = fs::rename(&staging, dir) {
        if had_previous {
            let _ = fs::rename(&previous, dir);
        }
        return Err(DetectorError::io("publish model artifact", e));
    }
    if had_previous {
        if let Err(e) = fs::remove_dir_all(&previous) {
            warn!(path = %previous.display(), error = %e, "failed to remove replaced artifact");
        }
    }
    info!(
        dir = %dir.display(),
        pair_id = %manifest.pair_id,
        validation_accuracy = manifest.validation_accuracy,
        "saved model artifact"
    );
    Ok(())
}

/// Exclusive claim on a model directory for the duration of a training run.
#[derive(Debug)]
pub struct TrainingLock {
    path: PathBuf,
}

impl TrainingLock {
    pub fn acquire(dir: &Path) -> Result<Self, DetectorError> {
        let path = sibling(dir, "training.lock")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DetectorError::io("create lock parent dir", e))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(DetectorError::configuration(format!(
                "another training run holds {}; remove it if that run is gone",
                path.display()
            ))),
            Err(e) => Err(DetectorError::io("create training lock", e)),
        }
    }
}

impl Drop for TrainingLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

//! Fixed block layout of the 425-dimensional feature vector.
//!
//! ```text
//! offset  len  block
//!      0  120  timbral   40 MFCC means | 40 MFCC std | 40 delta means
//!    120   15  spectral  centroid μσ | rolloff μσ | bandwidth μσ | 7 contrast μ | flatness μσ
//!    135    4  temporal  ZCR μσ | RMS μσ
//!    139    4  pitch     F0 mean | F0 std | F0 range | voiced ratio
//!    143   24  chroma    12 class means | 12 class std
//!    167    2  artifact  tempogram μσ
//!    169  256  mel       128 band means | 128 band std
//! ```
//!
//! Any change here must bump [`FEATURE_LAYOUT_VERSION`]; model artifacts record
//! the version they were trained against and refuse to load otherwise.

use std::fmt;

use serde::Serialize;

use crate::error::DetectorError;

pub const FEATURE_LAYOUT_VERSION: u32 = 1;

pub const N_MFCC: usize = 40;
pub const N_MELS: usize = 128;
pub const N_CONTRAST_BANDS: usize = 6;
pub const N_CHROMA: usize = 12;

pub const TIMBRAL_LEN: usize = 3 * N_MFCC;
pub const SPECTRAL_LEN: usize = 6 + (N_CONTRAST_BANDS + 1) + 2;
pub const TEMPORAL_LEN: usize = 4;
pub const PITCH_LEN: usize = 4;
pub const CHROMA_LEN: usize = 2 * N_CHROMA;
pub const ARTIFACT_LEN: usize = 2;
pub const MEL_LEN: usize = 2 * N_MELS;

pub const TIMBRAL_OFFSET: usize = 0;
pub const SPECTRAL_OFFSET: usize = TIMBRAL_OFFSET + TIMBRAL_LEN;
pub const TEMPORAL_OFFSET: usize = SPECTRAL_OFFSET + SPECTRAL_LEN;
pub const PITCH_OFFSET: usize = TEMPORAL_OFFSET + TEMPORAL_LEN;
pub const CHROMA_OFFSET: usize = PITCH_OFFSET + PITCH_LEN;
pub const ARTIFACT_OFFSET: usize = CHROMA_OFFSET + CHROMA_LEN;
pub const MEL_OFFSET: usize = ARTIFACT_OFFSET + ARTIFACT_LEN;

pub const FEATURE_DIM: usize = 425;

const _: () = assert!(MEL_OFFSET + MEL_LEN == FEATURE_DIM);

// Named positions read outside the extractor.
pub const SPECTRAL_CENTROID_MEAN: usize = SPECTRAL_OFFSET;
pub const ZCR_MEAN: usize = TEMPORAL_OFFSET;
pub const RMS_MEAN: usize = TEMPORAL_OFFSET + 2;
pub const PITCH_MEAN: usize = PITCH_OFFSET;
pub const PITCH_STD: usize = PITCH_OFFSET + 1;
pub const VOICED_RATIO: usize = PITCH_OFFSET + 3;
pub const TEMPOGRAM_MEAN: usize = ARTIFACT_OFFSET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Timbral,
    Spectral,
    Temporal,
    Pitch,
    Chroma,
    Artifact,
    Mel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureBlock {
    pub kind: BlockKind,
    pub offset: usize,
    pub len: usize,
}

impl FeatureBlock {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

pub const BLOCKS: [FeatureBlock; 7] = [
    FeatureBlock {
        kind: BlockKind::Timbral,
        offset: TIMBRAL_OFFSET,
        len: TIMBRAL_LEN,
    },
    FeatureBlock {
        kind: BlockKind::Spectral,
        offset: SPECTRAL_OFFSET,
        len: SPECTRAL_LEN,
    },
    FeatureBlock {
        kind: BlockKind::Temporal,
        offset: TEMPORAL_OFFSET,
        len: TEMPORAL_LEN,
    },
    FeatureBlock {
        kind: BlockKind::Pitch,
        offset: PITCH_OFFSET,
        len: PITCH_LEN,
    },
    FeatureBlock {
        kind: BlockKind::Chroma,
        offset: CHROMA_OFFSET,
        len: CHROMA_LEN,
    },
    FeatureBlock {
        kind: BlockKind::Artifact,
        offset: ARTIFACT_OFFSET,
        len: ARTIFACT_LEN,
    },
    FeatureBlock {
        kind: BlockKind::Mel,
        offset: MEL_OFFSET,
        len: MEL_LEN,
    },
];

pub fn block(kind: BlockKind) -> FeatureBlock {
    // BLOCKS covers every kind, in declaration order.
    BLOCKS[kind as usize]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionMismatch {
    pub expected: usize,
    pub got: usize,
}

impl fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feature dimension mismatch: expected {}, got {}",
            self.expected, self.got
        )
    }
}

/// Exactly [`FEATURE_DIM`] values in [`BLOCKS`] order.
#[derive(Clone, PartialEq)]
pub struct FeatureVector(Box<[f32; FEATURE_DIM]>);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self(Box::new([0.0; FEATURE_DIM]))
    }

    pub fn filled(value: f32) -> Self {
        Self(Box::new([value; FEATURE_DIM]))
    }

    pub fn from_slice(values: &[f32]) -> Result<Self, DimensionMismatch> {
        Self::try_from(values.to_vec())
    }

    pub fn as_slice(&self) -> &[f32] {
        self.0.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.0.as_mut_slice()
    }

    pub fn get(&self, index: usize) -> f32 {
        self.0[index]
    }

    pub fn block(&self, kind: BlockKind) -> &[f32] {
        &self.0[block(kind).range()]
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.0.to_vec()
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = DimensionMismatch;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        let got = values.len();
        values
            .into_boxed_slice()
            .try_into()
            .map(Self)
            .map_err(|_| DimensionMismatch {
                expected: FEATURE_DIM,
                got,
            })
    }
}

impl fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureVector")
            .field("dim", &FEATURE_DIM)
            .field("head", &&self.0[..4])
            .finish()
    }
}

/// Sequential writer that checks every block starts at its documented offset.
pub(crate) struct FeatureWriter {
    values: Vec<f32>,
}

impl FeatureWriter {
    pub(crate) fn new() -> Self {
        Self {
            values: Vec::with_capacity(FEATURE_DIM),
        }
    }

    pub(crate) fn begin(&mut self, kind: BlockKind) -> Result<(), DetectorError> {
        let expected = block(kind).offset;
        if self.values.len() != expected {
            return Err(DetectorError::configuration(format!(
                "{kind:?} block starts at {} but layout expects {expected}",
                self.values.len()
            )));
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, value: f64) {
        self.values.push(value as f32);
    }

    pub(crate) fn extend(&mut self, values: impl IntoIterator<Item = f64>) {
        self.values.extend(values.into_iter().map(|v| v as f32));
    }

    pub(crate) fn finish(self) -> Result<FeatureVector, DetectorError> {
        FeatureVector::try_from(self.values)
            .map_err(|e| DetectorError::configuration(e.to_string()))
    }
}

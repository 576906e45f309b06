use serde::{Deserialize, Serialize};

use crate::error::DetectorError;
use crate::features::{FeatureVector, FEATURE_DIM, FEATURE_LAYOUT_VERSION};

/// Dimensions with a training std below this are divided by this instead.
pub const SCALER_STD_FLOOR: f32 = 1e-6;

/// Persisted per-dimension statistics; `pair_id` ties them to one trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub pair_id: String,
    pub layout_version: u32,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

/// Per-dimension standardization, `(x - mean) / max(std, floor)`.
#[derive(Debug, Clone, Default)]
pub struct FeatureScaler {
    state: Option<ScalerState>,
}

impl FeatureScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    pub fn from_state(state: ScalerState) -> Result<Self, DetectorError> {
        if state.layout_version != FEATURE_LAYOUT_VERSION {
            return Err(DetectorError::configuration(format!(
                "scaler was fitted on feature layout v{}, extractor produces v{FEATURE_LAYOUT_VERSION}",
                state.layout_version
            )));
        }
        if state.mean.len() != FEATURE_DIM || state.std.len() != FEATURE_DIM {
            return Err(DetectorError::configuration(format!(
                "scaler statistics have {}/{} dimensions, expected {FEATURE_DIM}",
                state.mean.len(),
                state.std.len()
            )));
        }
        if state
            .mean
            .iter()
            .chain(&state.std)
            .any(|v| !v.is_finite())
        {
            return Err(DetectorError::configuration(
                "scaler statistics contain non-finite values",
            ));
        }
        Ok(Self { state: Some(state) })
    }

    /// Fits population mean and std over `rows`. Replaces any earlier fit.
    pub fn fit(&mut self, rows: &[FeatureVector], pair_id: &str) -> Result<(), DetectorError> {
        if rows.is_empty() {
            return Err(DetectorError::corpus("cannot fit scaler on zero samples"));
        }
        let n = rows.len() as f64;
        let mut mean = vec![0.0f64; FEATURE_DIM];
        for row in rows {
            for (acc, &v) in mean.iter_mut().zip(row.as_slice()) {
                *acc += v as f64;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }
        let mut var = vec![0.0f64; FEATURE_DIM];
        for row in rows {
            for ((acc, &v), m) in var.iter_mut().zip(row.as_slice()).zip(&mean) {
                *acc += (v as f64 - m).powi(2);
            }
        }

        let constant = var.iter().filter(|&&v| v / n < (SCALER_STD_FLOOR as f64).powi(2)).count();
        if constant > 0 {
            tracing::debug!(
                constant_dims = constant,
                "scaler found near-constant dimensions"
            );
        }

        self.state = Some(ScalerState {
            pair_id: pair_id.to_string(),
            layout_version: FEATURE_LAYOUT_VERSION,
            mean: mean.iter().map(|&m| m as f32).collect(),
            std: var.iter().map(|&v| (v / n).sqrt() as f32).collect(),
        });
        Ok(())
    }

    pub fn transform(&self, features: &FeatureVector) -> Result<FeatureVector, DetectorError> {
        let state = self.state.as_ref().ok_or_else(|| {
            DetectorError::configuration("feature scaler used before fit or load")
        })?;
        let mut out = features.clone();
        for ((x, m), s) in out.as_mut_slice().iter_mut().zip(&state.mean).zip(&state.std) {
            *x = (*x - m) / s.max(SCALER_STD_FLOOR);
        }
        Ok(out)
    }

    pub fn transform_batch(&self, rows: &[FeatureVector]) -> Result<Vec<FeatureVector>, DetectorError> {
        rows.iter().map(|row| self.transform(row)).collect()
    }

    pub fn pair_id(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.pair_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(f: impl Fn(usize) -> f32) -> FeatureVector {
        FeatureVector::try_from((0..FEATURE_DIM).map(f).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn transform_before_fit_is_configuration_error() {
        let scaler = FeatureScaler::new();
        assert!(matches!(
            scaler.transform(&FeatureVector::zeros()),
            Err(DetectorError::Configuration { .. })
        ));
    }

    #[test]
    fn fitted_rows_have_zero_mean_and_unit_std() {
        let rows = vec![row(|i| i as f32), row(|i| i as f32 + 2.0), row(|i| i as f32 + 4.0)];
        let mut scaler = FeatureScaler::new();
        scaler.fit(&rows, "pair").unwrap();
        let scaled = scaler.transform_batch(&rows).unwrap();
        for d in [0, 100, FEATURE_DIM - 1] {
            let col: Vec<f32> = scaled.iter().map(|r| r.get(d)).collect();
            let mean: f32 = col.iter().sum::<f32>() / 3.0;
            let var: f32 = col.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 3.0;
            assert!(mean.abs() < 1e-5);
            assert!((var.sqrt() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn constant_dimension_maps_to_zero() {
        let rows = vec![row(|_| 7.0), row(|_| 7.0)];
        let mut scaler = FeatureScaler::new();
        scaler.fit(&rows, "pair").unwrap();
        let scaled = scaler.transform(&row(|_| 7.0)).unwrap();
        assert!(scaled.as_slice().iter().all(|&v| v == 0.0));
        let off = scaler.transform(&row(|_| 7.5)).unwrap();
        assert!(off.is_finite());
    }

    #[test]
    fn fit_on_empty_corpus_fails() {
        let mut scaler = FeatureScaler::new();
        assert!(matches!(
            scaler.fit(&[], "pair"),
            Err(DetectorError::Corpus { .. })
        ));
    }

    #[test]
    fn state_with_wrong_layout_is_rejected() {
        let state = ScalerState {
            pair_id: "x".into(),
            layout_version: FEATURE_LAYOUT_VERSION + 1,
            mean: vec![0.0; FEATURE_DIM],
            std: vec![1.0; FEATURE_DIM],
        };
        assert!(FeatureScaler::from_state(state).is_err());
    }
}

use std::ops::Range;

use super::layout::N_CONTRAST_BANDS;
use super::mel::POWER_FLOOR;

const MAGNITUDE_EPS: f64 = 1e-12;

/// Per-frame descriptors computed from one magnitude spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SpectralFrame {
    pub centroid: f64,
    pub rolloff: f64,
    pub bandwidth: f64,
    pub flatness: f64,
}

pub(crate) fn describe(
    power: &[f64],
    magnitude: &[f64],
    freqs: &[f64],
    rolloff_percent: f64,
) -> SpectralFrame {
    let total: f64 = magnitude.iter().sum();
    if total <= MAGNITUDE_EPS {
        return SpectralFrame {
            centroid: 0.0,
            rolloff: 0.0,
            bandwidth: 0.0,
            flatness: flatness(power),
        };
    }

    let centroid = magnitude.iter().zip(freqs).map(|(m, f)| m * f).sum::<f64>() / total;
    let bandwidth = magnitude
        .iter()
        .zip(freqs)
        .map(|(m, f)| (m / total) * (f - centroid).powi(2))
        .sum::<f64>()
        .sqrt();

    let threshold = rolloff_percent * total;
    let mut cumulative = 0.0;
    let mut rolloff = freqs.last().copied().unwrap_or(0.0);
    for (m, &f) in magnitude.iter().zip(freqs) {
        cumulative += m;
        if cumulative >= threshold {
            rolloff = f;
            break;
        }
    }

    SpectralFrame {
        centroid,
        rolloff,
        bandwidth,
        flatness: flatness(power),
    }
}

/// Geometric over arithmetic mean of the floored power spectrum.
pub(crate) fn flatness(power: &[f64]) -> f64 {
    if power.is_empty() {
        return 0.0;
    }
    let n = power.len() as f64;
    let log_mean = power.iter().map(|p| p.max(POWER_FLOOR).ln()).sum::<f64>() / n;
    let mean = power.iter().map(|p| p.max(POWER_FLOOR)).sum::<f64>() / n;
    log_mean.exp() / mean
}

/// Octave sub-bands starting at `fmin`, plus everything above the last octave.
pub(crate) struct ContrastBands {
    bands: Vec<Range<usize>>,
    quantile: f64,
}

impl ContrastBands {
    pub(crate) fn new(freqs: &[f64], fmin: f64, quantile: f64) -> Self {
        let mut edges = vec![0.0];
        edges.extend((0..=N_CONTRAST_BANDS).map(|k| fmin * 2f64.powi(k as i32)));

        let bands = (0..=N_CONTRAST_BANDS)
            .map(|k| {
                let (low, high) = (edges[k], edges[k + 1]);
                let inside: Vec<usize> = freqs
                    .iter()
                    .enumerate()
                    .filter(|&(_, &f)| f >= low && f <= high)
                    .map(|(i, _)| i)
                    .collect();
                let (Some(&first), Some(&last)) = (inside.first(), inside.last()) else {
                    return 0..0;
                };
                let start = if k > 0 { first.saturating_sub(1) } else { first };
                let end = if k == N_CONTRAST_BANDS {
                    freqs.len()
                } else {
                    // Upper edge bin belongs to the next band.
                    last
                };
                start..end.max(start)
            })
            .collect();
        Self { bands, quantile }
    }

    /// Peak-minus-valley contrast in dB for each band of one magnitude spectrum.
    pub(crate) fn contrast(&self, magnitude: &[f64]) -> Vec<f64> {
        let mut sorted = Vec::new();
        self.bands
            .iter()
            .map(|band| {
                if band.is_empty() {
                    return 0.0;
                }
                sorted.clear();
                sorted.extend_from_slice(&magnitude[band.clone()]);
                sorted.sort_by(f64::total_cmp);
                let take = ((self.quantile * sorted.len() as f64).round() as usize).max(1);
                let valley = sorted[..take].iter().sum::<f64>() / take as f64;
                let peak = sorted[sorted.len() - take..].iter().sum::<f64>() / take as f64;
                to_db(peak) - to_db(valley)
            })
            .collect()
    }
}

fn to_db(value: f64) -> f64 {
    10.0 * value.max(POWER_FLOOR).log10()
}

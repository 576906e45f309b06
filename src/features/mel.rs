use std::f64::consts::PI;

/// Slaney-style mel filterbank with area normalization, `[mel][bin]`.
pub(crate) struct MelFilterbank {
    weights: Vec<Vec<f64>>,
}

impl MelFilterbank {
    pub(crate) fn new(num_mels: usize, freqs: &[f64], fmin: f64, fmax: f64) -> Self {
        let mel_min = hz_to_mel(fmin);
        let mel_max = hz_to_mel(fmax);
        let edges: Vec<f64> = (0..num_mels + 2)
            .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (num_mels + 1) as f64))
            .collect();

        let weights = (0..num_mels)
            .map(|m| {
                let (lo, center, hi) = (edges[m], edges[m + 1], edges[m + 2]);
                let norm = 2.0 / (hi - lo);
                freqs
                    .iter()
                    .map(|&f| {
                        let rising = (f - lo) / (center - lo);
                        let falling = (hi - f) / (hi - center);
                        rising.min(falling).max(0.0) * norm
                    })
                    .collect()
            })
            .collect();
        Self { weights }
    }

    pub(crate) fn apply(&self, power: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|row| row.iter().zip(power).map(|(w, p)| w * p).sum())
            .collect()
    }
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub(crate) fn hz_to_mel(hz: f64) -> f64 {
    if hz < MEL_MIN_LOG_HZ {
        hz / MEL_F_SP
    } else {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_log_step()
    }
}

pub(crate) fn mel_to_hz(mel: f64) -> f64 {
    if mel < MEL_MIN_LOG_MEL {
        mel * MEL_F_SP
    } else {
        MEL_MIN_LOG_HZ * (mel_log_step() * (mel - MEL_MIN_LOG_MEL)).exp()
    }
}

pub(crate) const POWER_FLOOR: f64 = 1e-10;

/// Converts a power matrix to decibels in place (reference 1.0), then clips
/// everything more than `top_db` below the global peak.
pub(crate) fn power_to_db(matrix: &mut [Vec<f64>], top_db: f64) {
    let mut peak = f64::NEG_INFINITY;
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v = 10.0 * v.max(POWER_FLOOR).log10();
            peak = peak.max(*v);
        }
    }
    let floor = peak - top_db;
    for row in matrix.iter_mut() {
        for v in row.iter_mut() {
            *v = v.max(floor);
        }
    }
}

/// Orthonormal DCT-II truncated to the first `n_out` coefficients.
pub(crate) struct Dct {
    basis: Vec<Vec<f64>>,
}

impl Dct {
    pub(crate) fn new(n_in: usize, n_out: usize) -> Self {
        let n = n_in as f64;
        let basis = (0..n_out)
            .map(|k| {
                let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
                (0..n_in)
                    .map(|i| scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                    .collect()
            })
            .collect();
        Self { basis }
    }

    pub(crate) fn apply(&self, input: &[f64]) -> Vec<f64> {
        self.basis
            .iter()
            .map(|row| row.iter().zip(input).map(|(b, x)| b * x).sum())
            .collect()
    }
}

/// Savitzky-Golay style first-order deltas over a 9-frame window with edge
/// replication, `[frame][coeff]`.
pub(crate) fn deltas(frames: &[Vec<f64>]) -> Vec<Vec<f64>> {
    const HALF: isize = 4;
    let denom: f64 = 2.0 * (1..=HALF).map(|n| (n * n) as f64).sum::<f64>();
    let last = frames.len() as isize - 1;
    let at = |t: isize, c: usize| frames[t.clamp(0, last) as usize][c];

    (0..frames.len() as isize)
        .map(|t| {
            let width = frames[t as usize].len();
            (0..width)
                .map(|c| {
                    (1..=HALF)
                        .map(|n| n as f64 * (at(t + n, c) - at(t - n, c)))
                        .sum::<f64>()
                        / denom
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::spectrum::fft_frequencies;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0, 440.0, 999.0, 1000.0, 4000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6, "{hz}");
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn filters_are_non_negative_and_cover_band() {
        let freqs = fft_frequencies(16_000.0, 2048);
        let bank = MelFilterbank::new(128, &freqs, 0.0, 8000.0);
        assert_eq!(bank.weights.len(), 128);
        for row in &bank.weights {
            assert!(row.iter().all(|&w| w >= 0.0));
            assert!(row.iter().any(|&w| w > 0.0));
        }
    }

    #[test]
    fn db_clips_to_top_db_below_peak() {
        let mut m = vec![vec![1.0, 1e-12], vec![0.1, 0.0]];
        power_to_db(&mut m, 80.0);
        assert!((m[0][0] - 0.0).abs() < 1e-12);
        assert!((m[1][0] + 10.0).abs() < 1e-9);
        assert!((m[0][1] + 80.0).abs() < 1e-9);
        assert!((m[1][1] + 80.0).abs() < 1e-9);
    }

    #[test]
    fn dct_of_constant_has_only_dc() {
        let dct = Dct::new(8, 4);
        let out = dct.apply(&[2.0; 8]);
        assert!((out[0] - 2.0 * 8f64.sqrt()).abs() < 1e-9);
        for c in &out[1..] {
            assert!(c.abs() < 1e-9);
        }
    }

    #[test]
    fn deltas_of_linear_ramp_are_slope() {
        let frames: Vec<Vec<f64>> = (0..20).map(|t| vec![3.0 * t as f64]).collect();
        let d = deltas(&frames);
        assert!((d[10][0] - 3.0).abs() < 1e-9);
        let single = deltas(&[vec![5.0]]);
        assert_eq!(single[0][0], 0.0);
    }
}

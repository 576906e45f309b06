use super::spectrum::Autocorrelator;
use super::stats::RunningStats;
use crate::config::FeatureConfig;

/// Frame-wise F0 estimate from the normalized autocorrelation peak.
pub(crate) struct PitchTracker {
    autocorrelator: Autocorrelator,
    sample_rate_hz: f64,
    min_lag: usize,
    max_lag: usize,
    rms_floor: f64,
    clarity: f64,
}

// Candidates within this fraction of the best peak win if they have a shorter lag.
const SUBHARMONIC_TOLERANCE: f64 = 0.9;

impl PitchTracker {
    pub(crate) fn new(config: &FeatureConfig, sample_rate_hz: f64) -> Self {
        let min_lag = (sample_rate_hz / config.pitch_max_hz).floor().max(2.0) as usize;
        let max_lag = (sample_rate_hz / config.pitch_min_hz).ceil() as usize;
        Self {
            autocorrelator: Autocorrelator::new(config.n_fft),
            sample_rate_hz,
            min_lag,
            max_lag: max_lag.min(config.n_fft.saturating_sub(2)),
            rms_floor: config.voicing_rms_floor,
            clarity: config.voicing_clarity,
        }
    }

    /// Returns the fundamental in Hz, or `None` for unvoiced frames.
    pub(crate) fn estimate(&self, frame: &[f32]) -> Option<f64> {
        let n = frame.len();
        if n <= self.max_lag + 1 {
            return None;
        }
        let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / n as f64;
        let centered: Vec<f64> = frame.iter().map(|&s| s as f64 - mean).collect();
        let energy: f64 = centered.iter().map(|x| x * x).sum();
        if (energy / n as f64).sqrt() <= self.rms_floor {
            return None;
        }

        let ac = self.autocorrelator.autocorrelate(&centered);
        // prefix[i] = energy of centered[..i]
        let mut prefix = Vec::with_capacity(n + 1);
        let mut running = 0.0;
        prefix.push(running);
        for x in &centered {
            running += x * x;
            prefix.push(running);
        }
        let nccf = |lag: usize| -> f64 {
            let head = prefix[n - lag];
            let tail = prefix[n] - prefix[lag];
            let denom = (head * tail).sqrt();
            if denom <= f64::EPSILON {
                0.0
            } else {
                ac[lag] / denom
            }
        };

        let scores: Vec<f64> = (self.min_lag..=self.max_lag).map(nccf).collect();
        let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if best < self.clarity {
            return None;
        }

        let chosen = (0..scores.len())
            .find(|&i| {
                let left = if i == 0 { f64::NEG_INFINITY } else { scores[i - 1] };
                let right = scores.get(i + 1).copied().unwrap_or(f64::NEG_INFINITY);
                scores[i] >= SUBHARMONIC_TOLERANCE * best
                    && scores[i] >= left
                    && scores[i] >= right
            })
            .unwrap_or(0);

        let lag = (self.min_lag + chosen) as f64 + self.parabolic_offset(&scores, chosen);
        if lag <= 0.0 {
            return None;
        }
        Some(self.sample_rate_hz / lag)
    }

    fn parabolic_offset(&self, scores: &[f64], i: usize) -> f64 {
        if i == 0 || i + 1 >= scores.len() {
            return 0.0;
        }
        let (a, b, c) = (scores[i - 1], scores[i], scores[i + 1]);
        let curvature = a - 2.0 * b + c;
        if curvature.abs() <= f64::EPSILON {
            0.0
        } else {
            (0.5 * (a - c) / curvature).clamp(-0.5, 0.5)
        }
    }
}

/// F0 mean, std and range over voiced frames, plus the voiced-frame ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PitchSummary {
    pub mean: f64,
    pub std: f64,
    pub range: f64,
    pub voiced_ratio: f64,
}

impl PitchSummary {
    pub(crate) fn from_track(track: &[Option<f64>]) -> Self {
        let mut stats = RunningStats::default();
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for f0 in track.iter().flatten() {
            stats.push(*f0);
            lo = lo.min(*f0);
            hi = hi.max(*f0);
        }
        if stats.count() == 0 {
            return Self::default();
        }
        Self {
            mean: stats.mean(),
            std: stats.std(),
            range: hi - lo,
            voiced_ratio: stats.count() as f64 / track.len() as f64,
        }
    }

    pub(crate) fn values(&self) -> [f64; 4] {
        [self.mean, self.std, self.range, self.voiced_ratio]
    }
}

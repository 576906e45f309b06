use super::spectrum::{hann_periodic, Autocorrelator};
use super::stats::RunningStats;

/// Onset strength per frame: mean positive log-mel flux, first frame zero.
pub(crate) fn onset_envelope(mel_db: &[Vec<f64>]) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(mel_db.len());
    if mel_db.is_empty() {
        return envelope;
    }
    envelope.push(0.0);
    for pair in mel_db.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let flux: f64 = cur.iter().zip(prev).map(|(c, p)| (c - p).max(0.0)).sum();
        envelope.push(flux / cur.len().max(1) as f64);
    }
    envelope
}

/// Local autocorrelation of the onset envelope, one column per frame.
pub(crate) struct Tempogram {
    window: Vec<f64>,
    autocorrelator: Autocorrelator,
}

impl Tempogram {
    pub(crate) fn new(window_frames: usize) -> Self {
        Self {
            window: hann_periodic(window_frames),
            autocorrelator: Autocorrelator::new(window_frames),
        }
    }

    /// Mean and standard deviation over every tempogram cell; columns are
    /// peak-normalized and all-zero columns stay zero.
    pub(crate) fn summarize(&self, envelope: &[f64]) -> (f64, f64) {
        let width = self.window.len();
        let half = width / 2;
        let mut stats = RunningStats::default();
        let mut segment = vec![0.0; width];

        for t in 0..envelope.len() {
            for (i, slot) in segment.iter_mut().enumerate() {
                let src = (t + i).checked_sub(half);
                *slot = src
                    .and_then(|s| envelope.get(s))
                    .map_or(0.0, |v| v * self.window[i]);
            }
            let mut column = self.autocorrelator.autocorrelate(&segment);
            let peak = column.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            if peak > f64::MIN_POSITIVE {
                for v in column.iter_mut() {
                    *v /= peak;
                }
            }
            for v in column {
                stats.push(v);
            }
        }
        (stats.mean(), stats.std())
    }
}

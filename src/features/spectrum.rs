use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Short-time Fourier transform over un-padded frames with a periodic Hann window.
pub(crate) struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl Stft {
    pub(crate) fn new(n_fft: usize, hop: usize) -> Self {
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop,
            window: hann_periodic(n_fft),
            fft,
        }
    }

    pub(crate) fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub(crate) fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub(crate) fn frame_count(&self, n_samples: usize) -> usize {
        if n_samples < self.n_fft {
            0
        } else {
            (n_samples - self.n_fft) / self.hop + 1
        }
    }

    pub(crate) fn frames<'a>(&self, samples: &'a [f32]) -> impl Iterator<Item = &'a [f32]> + 'a {
        let (n_fft, hop) = (self.n_fft, self.hop);
        (0..self.frame_count(samples.len())).map(move |t| &samples[t * hop..t * hop + n_fft])
    }

    /// Power spectrogram, frame-major: `[frame][bin]` with `n_fft / 2 + 1` bins.
    pub(crate) fn power(&self, samples: &[f32]) -> Vec<Vec<f64>> {
        let mut buffer = vec![Complex::new(0.0, 0.0); self.n_fft];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];
        self.frames(samples)
            .map(|frame| {
                for ((slot, &s), &w) in buffer.iter_mut().zip(frame).zip(&self.window) {
                    *slot = Complex::new(s as f64 * w, 0.0);
                }
                self.fft.process_with_scratch(&mut buffer, &mut scratch);
                buffer[..self.n_bins()]
                    .iter()
                    .map(|c| c.norm_sqr())
                    .collect::<Vec<f64>>()
            })
            .collect()
    }
}

pub(crate) fn hann_periodic(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / len as f64).cos())
        .collect()
}

/// Centre frequency of each rfft bin.
pub(crate) fn fft_frequencies(sample_rate_hz: f64, n_fft: usize) -> Vec<f64> {
    (0..=n_fft / 2)
        .map(|k| k as f64 * sample_rate_hz / n_fft as f64)
        .collect()
}

/// Linear autocorrelation via a zero-padded FFT, returning lags `0..signal.len()`.
pub(crate) struct Autocorrelator {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Autocorrelator {
    pub(crate) fn new(max_len: usize) -> Self {
        let size = (2 * max_len).next_power_of_two();
        let mut planner = FftPlanner::<f64>::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    pub(crate) fn autocorrelate(&self, signal: &[f64]) -> Vec<f64> {
        let len = signal.len().min(self.size / 2);
        let mut buffer = vec![Complex::new(0.0, 0.0); self.size];
        for (slot, &s) in buffer.iter_mut().zip(&signal[..len]) {
            *slot = Complex::new(s, 0.0);
        }
        self.forward.process(&mut buffer);
        for c in buffer.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.inverse.process(&mut buffer);
        let scale = self.size as f64;
        buffer[..len].iter().map(|c| c.re / scale).collect()
    }
}

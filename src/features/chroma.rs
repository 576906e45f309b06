use super::layout::N_CHROMA;

// C1; bins below this carry no usable pitch-class information.
const CHROMA_MIN_HZ: f64 = 32.7;

/// Folds spectral bins onto the twelve equal-tempered pitch classes, C = 0.
pub(crate) struct ChromaMap {
    classes: Vec<Option<usize>>,
}

impl ChromaMap {
    pub(crate) fn new(freqs: &[f64]) -> Self {
        let classes = freqs
            .iter()
            .map(|&f| (f >= CHROMA_MIN_HZ).then(|| pitch_class(f)))
            .collect();
        Self { classes }
    }

    /// Chroma energies of one power spectrum, scaled so the strongest class is 1.
    pub(crate) fn apply(&self, power: &[f64]) -> [f64; N_CHROMA] {
        let mut chroma = [0.0; N_CHROMA];
        for (class, &p) in self.classes.iter().zip(power) {
            if let Some(c) = class {
                chroma[*c] += p;
            }
        }
        let peak = chroma.iter().copied().fold(0.0, f64::max);
        if peak > f64::MIN_POSITIVE {
            for v in chroma.iter_mut() {
                *v /= peak;
            }
        }
        chroma
    }
}

fn pitch_class(freq_hz: f64) -> usize {
    let midi = 69.0 + 12.0 * (freq_hz / 440.0).log2();
    (midi.round() as i64).rem_euclid(N_CHROMA as i64) as usize
}

//! Waveform to fixed-length feature vector.

mod chroma;
pub mod layout;
mod mel;
mod pitch;
mod rhythm;
mod spectral;
mod spectrum;
mod stats;
mod temporal;

use tracing::{debug, warn};

use crate::config::FeatureConfig;
use crate::error::DetectorError;
use crate::types::Waveform;

use chroma::ChromaMap;
pub use layout::{
    BlockKind, FeatureBlock, FeatureVector, BLOCKS, FEATURE_DIM, FEATURE_LAYOUT_VERSION,
};
use layout::{FeatureWriter, N_CHROMA, N_CONTRAST_BANDS, N_MELS, N_MFCC};
use mel::{Dct, MelFilterbank};
use pitch::{PitchSummary, PitchTracker};
use rhythm::Tempogram;
use spectral::ContrastBands;
use spectrum::Stft;
use stats::{ColumnStats, RunningStats};

/// Peak amplitude under which a waveform is reported as effectively silent.
pub const SILENCE_PEAK_AMPLITUDE: f32 = 0.01;

/// Deterministic extractor; all filterbanks and FFT plans are built once.
pub struct FeatureExtractor {
    config: FeatureConfig,
    sample_rate_hz: f64,
    stft: Stft,
    freqs: Vec<f64>,
    mel: MelFilterbank,
    dct: Dct,
    contrast: ContrastBands,
    chroma: ChromaMap,
    pitch: PitchTracker,
    tempogram: Tempogram,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        let sample_rate_hz = Waveform::SAMPLE_RATE_HZ as f64;
        let stft = Stft::new(config.n_fft, config.hop_length);
        let freqs = spectrum::fft_frequencies(sample_rate_hz, config.n_fft);
        let mel = MelFilterbank::new(N_MELS, &freqs, 0.0, sample_rate_hz / 2.0);
        let contrast =
            ContrastBands::new(&freqs, config.contrast_fmin_hz, config.contrast_quantile);
        let chroma = ChromaMap::new(&freqs);
        let pitch = PitchTracker::new(&config, sample_rate_hz);
        let tempogram = Tempogram::new(config.tempogram_window);
        Ok(Self {
            sample_rate_hz,
            stft,
            mel,
            dct: Dct::new(N_MELS, N_MFCC),
            contrast,
            chroma,
            pitch,
            tempogram,
            freqs,
            config,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Shortest waveform that yields at least one analysis frame.
    pub fn min_samples(&self) -> usize {
        self.stft.n_fft()
    }

    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector, DetectorError> {
        let samples = waveform.samples();
        if samples.len() < self.min_samples() {
            return Err(DetectorError::InsufficientAudio {
                samples: samples.len(),
                required: self.min_samples(),
            });
        }
        let peak = waveform.peak_amplitude();
        if peak < SILENCE_PEAK_AMPLITUDE {
            warn!(
                peak_amplitude = peak,
                "waveform is near-silent; features will be degenerate"
            );
        }

        let power = self.stft.power(samples);
        let magnitude: Vec<Vec<f64>> = power
            .iter()
            .map(|frame| frame.iter().map(|p| p.sqrt()).collect())
            .collect();
        let mel_power: Vec<Vec<f64>> = power.iter().map(|frame| self.mel.apply(frame)).collect();
        let mut mel_db = mel_power.clone();
        mel::power_to_db(&mut mel_db, self.config.top_db);

        let mut out = FeatureWriter::new();
        self.write_timbral(&mut out, &mel_db)?;
        self.write_spectral(&mut out, &power, &magnitude)?;
        self.write_temporal(&mut out, samples)?;
        self.write_pitch(&mut out, samples)?;
        self.write_chroma(&mut out, &power)?;
        self.write_artifact(&mut out, &mel_db)?;
        self.write_mel(&mut out, &mel_power)?;
        let features = out.finish()?;

        debug!(
            frames = power.len(),
            duration_secs = waveform.duration_secs(),
            "extracted feature vector"
        );
        Ok(features)
    }

    fn write_timbral(
        &self,
        out: &mut FeatureWriter,
        mel_db: &[Vec<f64>],
    ) -> Result<(), DetectorError> {
        out.begin(BlockKind::Timbral)?;
        let mfcc: Vec<Vec<f64>> = mel_db.iter().map(|frame| self.dct.apply(frame)).collect();
        let deltas = mel::deltas(&mfcc);

        let mut coeffs = ColumnStats::new(N_MFCC);
        let mut delta_stats = ColumnStats::new(N_MFCC);
        for (c, d) in mfcc.iter().zip(&deltas) {
            coeffs.push_row(c);
            delta_stats.push_row(d);
        }
        out.extend(coeffs.means());
        out.extend(coeffs.stds());
        out.extend(delta_stats.means());
        Ok(())
    }

    fn write_spectral(
        &self,
        out: &mut FeatureWriter,
        power: &[Vec<f64>],
        magnitude: &[Vec<f64>],
    ) -> Result<(), DetectorError> {
        out.begin(BlockKind::Spectral)?;
        let mut centroid = RunningStats::default();
        let mut rolloff = RunningStats::default();
        let mut bandwidth = RunningStats::default();
        let mut flatness = RunningStats::default();
        let mut contrast = ColumnStats::new(N_CONTRAST_BANDS + 1);

        for (p, m) in power.iter().zip(magnitude) {
            let frame = spectral::describe(p, m, &self.freqs, self.config.rolloff_percent);
            centroid.push(frame.centroid);
            rolloff.push(frame.rolloff);
            bandwidth.push(frame.bandwidth);
            flatness.push(frame.flatness);
            contrast.push_row(&self.contrast.contrast(m));
        }

        for acc in [centroid, rolloff, bandwidth] {
            out.push(acc.mean());
            out.push(acc.std());
        }
        out.extend(contrast.means());
        out.push(flatness.mean());
        out.push(flatness.std());
        Ok(())
    }

    fn write_temporal(
        &self,
        out: &mut FeatureWriter,
        samples: &[f32],
    ) -> Result<(), DetectorError> {
        out.begin(BlockKind::Temporal)?;
        let mut zcr = RunningStats::default();
        let mut rms = RunningStats::default();
        for frame in self.stft.frames(samples) {
            zcr.push(temporal::zero_crossing_rate(frame));
            rms.push(temporal::rms(frame));
        }
        out.extend([zcr.mean(), zcr.std(), rms.mean(), rms.std()]);
        Ok(())
    }

    fn write_pitch(&self, out: &mut FeatureWriter, samples: &[f32]) -> Result<(), DetectorError> {
        out.begin(BlockKind::Pitch)?;
        let track: Vec<Option<f64>> = self
            .stft
            .frames(samples)
            .map(|frame| self.pitch.estimate(frame))
            .collect();
        out.extend(PitchSummary::from_track(&track).values());
        Ok(())
    }

    fn write_chroma(
        &self,
        out: &mut FeatureWriter,
        power: &[Vec<f64>],
    ) -> Result<(), DetectorError> {
        out.begin(BlockKind::Chroma)?;
        let mut classes = ColumnStats::new(N_CHROMA);
        for frame in power {
            classes.push_row(&self.chroma.apply(frame));
        }
        out.extend(classes.means());
        out.extend(classes.stds());
        Ok(())
    }

    fn write_artifact(
        &self,
        out: &mut FeatureWriter,
        mel_db: &[Vec<f64>],
    ) -> Result<(), DetectorError> {
        out.begin(BlockKind::Artifact)?;
        let envelope = rhythm::onset_envelope(mel_db);
        let (mean, std) = self.tempogram.summarize(&envelope);
        out.extend([mean, std]);
        Ok(())
    }

    fn write_mel(
        &self,
        out: &mut FeatureWriter,
        mel_power: &[Vec<f64>],
    ) -> Result<(), DetectorError> {
        out.begin(BlockKind::Mel)?;
        let mut bands = ColumnStats::new(N_MELS);
        for frame in mel_power {
            bands.push_row(frame);
        }
        out.extend(bands.means());
        out.extend(bands.stds());
        Ok(())
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::layout::{PITCH_MEAN, SPECTRAL_CENTROID_MEAN, VOICED_RATIO, ZCR_MEAN};

    fn tone(freq: f64, secs: f64) -> Waveform {
        let n = (secs * 16_000.0) as usize;
        let samples = (0..n)
            .map(|i| (0.4 * (2.0 * std::f64::consts::PI * freq * i as f64 / 16_000.0).sin()) as f32)
            .collect();
        Waveform::from_mono(16_000, samples).unwrap()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig::default()).unwrap()
    }

    #[test]
    fn tone_produces_finite_vector_with_expected_pitch() {
        let features = extractor().extract(&tone(220.0, 1.0)).unwrap();
        assert_eq!(features.as_slice().len(), FEATURE_DIM);
        assert!(features.is_finite());
        assert!((features.get(PITCH_MEAN) - 220.0).abs() < 5.0);
        assert!(features.get(VOICED_RATIO) > 0.9);
        assert!((features.get(SPECTRAL_CENTROID_MEAN) - 220.0).abs() < 150.0);
        assert!(features.get(ZCR_MEAN) > 0.0);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = extractor();
        let wf = tone(330.0, 0.5);
        assert_eq!(extractor.extract(&wf).unwrap(), extractor.extract(&wf).unwrap());
    }

    #[test]
    fn one_frame_is_enough() {
        let wf = Waveform::from_mono(16_000, vec![0.1; 2048]).unwrap();
        assert!(extractor().extract(&wf).unwrap().is_finite());
    }

    #[test]
    fn short_waveform_is_insufficient() {
        let wf = Waveform::from_mono(16_000, vec![0.1; 2047]).unwrap();
        let err = extractor().extract(&wf).unwrap_err();
        assert!(matches!(
            err,
            DetectorError::InsufficientAudio {
                samples: 2047,
                required: 2048
            }
        ));
    }

    #[test]
    fn silence_is_degenerate_but_finite() {
        let wf = Waveform::from_mono(16_000, vec![0.0; 16_000]).unwrap();
        let features = extractor().extract(&wf).unwrap();
        assert!(features.is_finite());
        assert_eq!(features.get(VOICED_RATIO), 0.0);
        assert_eq!(features.get(ZCR_MEAN), 0.0);
        assert!(features.block(BlockKind::Mel).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = FeatureConfig {
            hop_length: 0,
            ..FeatureConfig::default()
        };
        assert!(matches!(
            FeatureExtractor::new(config),
            Err(DetectorError::Configuration { .. })
        ));
    }
}

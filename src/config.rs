use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;
use crate::risk::keywords::normalize_keyword;
use crate::types::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Directory holding `manifest.json`, `scaler.json` and `model.safetensors`.
    pub model_dir: String,
    pub device: String,
    pub expected_sample_rate_hz: u32,
    pub feature: FeatureConfig,
    pub risk: RiskConfig,
}

impl DetectorConfig {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;

    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DetectorError::io("read detector config", e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| DetectorError::json("parse detector config", e))?;
        config.feature.validate()?;
        config.risk.validate()?;
        Ok(config)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dir: String::new(),
            device: "cpu".to_string(),
            expected_sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
            feature: FeatureConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

/// DSP parameters that do not change the shape of the feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub rolloff_percent: f64,
    pub contrast_fmin_hz: f64,
    pub contrast_quantile: f64,
    pub pitch_min_hz: f64,
    pub pitch_max_hz: f64,
    /// Frames with RMS below this are unvoiced regardless of periodicity.
    pub voicing_rms_floor: f64,
    /// Minimum normalized autocorrelation peak for a voiced frame.
    pub voicing_clarity: f64,
    pub top_db: f64,
    /// Onset frames per tempogram window.
    pub tempogram_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            rolloff_percent: 0.85,
            contrast_fmin_hz: 200.0,
            contrast_quantile: 0.02,
            pitch_min_hz: 65.0,
            pitch_max_hz: 500.0,
            voicing_rms_floor: 1e-3,
            voicing_clarity: 0.3,
            top_db: 80.0,
            tempogram_window: 384,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        let nyquist = DetectorConfig::DEFAULT_SAMPLE_RATE_HZ as f64 / 2.0;
        if self.n_fft < 256 {
            return Err(DetectorError::configuration(format!(
                "n_fft must be at least 256, got {}",
                self.n_fft
            )));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(DetectorError::configuration(format!(
                "hop_length must be in 1..={}, got {}",
                self.n_fft, self.hop_length
            )));
        }
        if !(self.rolloff_percent > 0.0 && self.rolloff_percent < 1.0) {
            return Err(DetectorError::configuration(format!(
                "rolloff_percent must be in (0, 1), got {}",
                self.rolloff_percent
            )));
        }
        if !(self.contrast_quantile > 0.0 && self.contrast_quantile < 0.5) {
            return Err(DetectorError::configuration(format!(
                "contrast_quantile must be in (0, 0.5), got {}",
                self.contrast_quantile
            )));
        }
        if !(self.contrast_fmin_hz > 0.0 && self.contrast_fmin_hz * 32.0 < nyquist) {
            return Err(DetectorError::configuration(format!(
                "contrast_fmin_hz must leave room for all octave bands below {nyquist} Hz, got {}",
                self.contrast_fmin_hz
            )));
        }
        if !(self.pitch_min_hz > 0.0 && self.pitch_min_hz < self.pitch_max_hz)
            || self.pitch_max_hz >= nyquist
        {
            return Err(DetectorError::configuration(format!(
                "pitch range {}..{} Hz is invalid",
                self.pitch_min_hz, self.pitch_max_hz
            )));
        }
        let max_lag = (DetectorConfig::DEFAULT_SAMPLE_RATE_HZ as f64 / self.pitch_min_hz).ceil();
        if max_lag as usize >= self.n_fft {
            return Err(DetectorError::configuration(format!(
                "pitch_min_hz {} needs a lag of {max_lag} samples, longer than n_fft {}",
                self.pitch_min_hz, self.n_fft
            )));
        }
        if self.top_db <= 0.0 || self.tempogram_window < 2 {
            return Err(DetectorError::configuration(
                "top_db must be positive and tempogram_window at least 2",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCategory {
    /// Time pressure: "urgent", "blocked", "final notice".
    Urgency,
    /// Requests for secrets: "password", "otp", "cvv".
    Credential,
    /// Money movement: "wire transfer", "gift card".
    Payment,
}

impl KeywordCategory {
    pub fn alert_prefix(self) -> &'static str {
        match self {
            KeywordCategory::Urgency => "urgency keyword",
            KeywordCategory::Credential => "credential request keyword",
            KeywordCategory::Payment => "payment keyword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub category: KeywordCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryPoints {
    pub urgency: f64,
    pub credential: f64,
    pub payment: f64,
}

impl CategoryPoints {
    pub fn get(&self, category: KeywordCategory) -> f64 {
        match category {
            KeywordCategory::Urgency => self.urgency,
            KeywordCategory::Credential => self.credential,
            KeywordCategory::Payment => self.payment,
        }
    }
}

/// Cut points on the 0..=100 risk score; a score strictly above a cut point
/// reaches that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium_above: u8,
    pub high_above: u8,
    pub critical_above: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium_above: 25,
            high_above: 50,
            critical_above: 75,
        }
    }
}

impl RiskThresholds {
    pub fn level(&self, score: u8) -> RiskLevel {
        if score > self.critical_above {
            RiskLevel::Critical
        } else if score > self.high_above {
            RiskLevel::High
        } else if score > self.medium_above {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.medium_above < self.high_above
            && self.high_above < self.critical_above
            && self.critical_above < 100
        {
            return Ok(());
        }
        Err(DetectorError::configuration(format!(
            "risk thresholds must satisfy medium < high < critical < 100, got {}/{}/{}",
            self.medium_above, self.high_above, self.critical_above
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub ai_weight: f64,
    pub urgency_weight: f64,
    pub keyword_weight: f64,
    /// Points per distinct matched keyword toward the keyword score.
    pub keyword_points: f64,
    pub category_points: CategoryPoints,
    /// Multiplier applied when keywords co-occur with a strong AI or urgency signal.
    pub boost_factor: f64,
    pub boost_ai_above: f64,
    pub boost_urgency_above: f64,
    pub synthetic_alert_above: f64,
    pub urgency_alert_above: f64,
    pub low_risk_ai_below: f64,
    pub thresholds: RiskThresholds,
    pub lexicon: Vec<KeywordRule>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            ai_weight: 0.5,
            urgency_weight: 0.2,
            keyword_weight: 0.3,
            keyword_points: 25.0,
            category_points: CategoryPoints {
                urgency: 35.0,
                credential: 30.0,
                payment: 25.0,
            },
            boost_factor: 1.3,
            boost_ai_above: 50.0,
            boost_urgency_above: 60.0,
            synthetic_alert_above: 85.0,
            urgency_alert_above: 75.0,
            low_risk_ai_below: 20.0,
            thresholds: RiskThresholds::default(),
            lexicon: default_lexicon(),
        }
    }
}

impl RiskConfig {
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| DetectorError::io("read risk config", e))?;
        let config: Self =
            serde_json::from_str(&data).map_err(|e| DetectorError::json("parse risk config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        let non_negative = [
            ("ai_weight", self.ai_weight),
            ("urgency_weight", self.urgency_weight),
            ("keyword_weight", self.keyword_weight),
            ("keyword_points", self.keyword_points),
            ("category_points.urgency", self.category_points.urgency),
            ("category_points.credential", self.category_points.credential),
            ("category_points.payment", self.category_points.payment),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DetectorError::configuration(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        // A boost below 1 would make risk drop as the AI probability rises.
        if !self.boost_factor.is_finite() || self.boost_factor < 1.0 {
            return Err(DetectorError::configuration(format!(
                "boost_factor must be >= 1.0, got {}",
                self.boost_factor
            )));
        }
        if self.lexicon.iter().any(|rule| rule.keyword.trim().is_empty()) {
            return Err(DetectorError::configuration("lexicon contains an empty keyword"));
        }
        self.thresholds.validate()
    }

    /// Category of a keyword. Both sides are lowercased with whitespace collapsed,
    /// the same normalization the matcher applies to its hits.
    pub fn category_of(&self, keyword: &str) -> Option<KeywordCategory> {
        let keyword = normalize_keyword(keyword);
        self.lexicon
            .iter()
            .find(|rule| normalize_keyword(&rule.keyword) == keyword)
            .map(|rule| rule.category)
    }
}

fn default_lexicon() -> Vec<KeywordRule> {
    const URGENCY: &[&str] = &[
        "urgent",
        "immediately",
        "right now",
        "act now",
        "final notice",
        "last chance",
        "expiry",
        "expires",
        "blocked",
        "suspended",
        "within 24 hours",
    ];
    const CREDENTIAL: &[&str] = &[
        "password",
        "otp",
        "one time password",
        "verification code",
        "pin",
        "cvv",
        "social security",
        "ssn",
        "verify",
        "login details",
    ];
    const PAYMENT: &[&str] = &[
        "credit card",
        "debit card",
        "bank account",
        "wire transfer",
        "gift card",
        "refund",
        "bitcoin",
        "upi",
        "processing fee",
    ];

    let mut rules = Vec::with_capacity(URGENCY.len() + CREDENTIAL.len() + PAYMENT.len());
    for (words, category) in [
        (URGENCY, KeywordCategory::Urgency),
        (CREDENTIAL, KeywordCategory::Credential),
        (PAYMENT, KeywordCategory::Payment),
    ] {
        rules.extend(words.iter().map(|w| KeywordRule {
            keyword: (*w).to_string(),
            category,
        }));
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_config_default() {
        let config = DetectorConfig::default();
        assert!(config.model_dir.is_empty());
        assert_eq!(config.device, "cpu");
        assert_eq!(
            config.expected_sample_rate_hz,
            DetectorConfig::DEFAULT_SAMPLE_RATE_HZ
        );
        assert_eq!(config.expected_sample_rate_hz, 16_000);
        config.feature.validate().expect("default feature config is valid");
        config.risk.validate().expect("default risk config is valid");
    }

    #[test]
    fn feature_config_rejects_pitch_lag_longer_than_frame() {
        let config = FeatureConfig {
            n_fft: 256,
            hop_length: 128,
            pitch_min_hz: 50.0,
            ..FeatureConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DetectorError::Configuration { .. }));
    }

    #[test]
    fn thresholds_cover_every_score_monotonically() {
        let thresholds = RiskThresholds::default();
        let mut previous = RiskLevel::Low;
        for score in 0..=100u8 {
            let level = thresholds.level(score);
            assert!(level >= previous, "score {score} regressed to {level:?}");
            previous = level;
        }
        assert_eq!(thresholds.level(0), RiskLevel::Low);
        assert_eq!(thresholds.level(25), RiskLevel::Low);
        assert_eq!(thresholds.level(26), RiskLevel::Medium);
        assert_eq!(thresholds.level(51), RiskLevel::High);
        assert_eq!(thresholds.level(100), RiskLevel::Critical);
    }

    #[test]
    fn thresholds_must_be_strictly_increasing() {
        let bad = RiskThresholds {
            medium_above: 40,
            high_above: 40,
            critical_above: 90,
        };
        assert!(bad.validate().is_err());
        let unreachable_critical = RiskThresholds {
            medium_above: 10,
            high_above: 20,
            critical_above: 100,
        };
        assert!(unreachable_critical.validate().is_err());
    }

    #[test]
    fn risk_config_parses_partial_json_with_defaults() {
        let json = r#"{
            "ai_weight": 0.6,
            "thresholds": { "medium_above": 30, "high_above": 60, "critical_above": 85 }
        }"#;
        let config: RiskConfig = serde_json::from_str(json).expect("valid risk config json");
        config.validate().unwrap();
        assert!((config.ai_weight - 0.6).abs() < 1e-12);
        assert!((config.keyword_weight - 0.3).abs() < 1e-12);
        assert_eq!(config.thresholds.level(85), RiskLevel::High);
        assert_eq!(config.thresholds.level(86), RiskLevel::Critical);
        assert!(!config.lexicon.is_empty());
    }

    #[test]
    fn risk_config_rejects_shrinking_boost() {
        let config = RiskConfig {
            boost_factor: 0.8,
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn category_lookup_is_case_insensitive() {
        let config = RiskConfig::default();
        assert_eq!(config.category_of("OTP"), Some(KeywordCategory::Credential));
        assert_eq!(
            config.category_of("Wire Transfer"),
            Some(KeywordCategory::Payment)
        );
        assert_eq!(config.category_of("weather"), None);
    }

    #[test]
    fn category_lookup_normalizes_custom_entries() {
        let config = RiskConfig {
            lexicon: vec![
                KeywordRule {
                    keyword: "Wire  Transfer".into(),
                    category: KeywordCategory::Payment,
                },
                KeywordRule {
                    keyword: "SOFORT ÜBERWEISEN".into(),
                    category: KeywordCategory::Urgency,
                },
            ],
            ..RiskConfig::default()
        };
        assert_eq!(
            config.category_of("wire transfer"),
            Some(KeywordCategory::Payment)
        );
        assert_eq!(config.category_of("gift card"), None);
        assert_eq!(
            config.category_of("sofort\tüberweisen"),
            Some(KeywordCategory::Urgency)
        );
    }
}

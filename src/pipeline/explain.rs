use crate::features::layout::{PITCH_STD, SPECTRAL_CENTROID_MEAN, VOICED_RATIO, ZCR_MEAN};
use crate::features::FeatureVector;
use crate::types::{ClassificationResult, Label};

const BRIGHT_CENTROID_HZ: f32 = 2000.0;
const LOW_ZCR: f32 = 0.05;
const FLAT_PITCH_STD_HZ: f32 = 20.0;
const LIVELY_PITCH_STD_HZ: f32 = 50.0;
const HIGH_AI_CONFIDENCE: f32 = 0.9;
const HIGH_HUMAN_CONFIDENCE: f32 = 0.8;

/// Short reasons behind a classification, read from the unscaled features.
pub fn explain(features: &FeatureVector, result: &ClassificationResult) -> String {
    let centroid = features.get(SPECTRAL_CENTROID_MEAN);
    let zcr = features.get(ZCR_MEAN);
    let pitch_std = features.get(PITCH_STD);
    let voiced = features.get(VOICED_RATIO) > 0.0;

    let mut reasons: Vec<String> = Vec::new();
    match result.label {
        Label::AiGenerated => {
            if centroid > BRIGHT_CENTROID_HZ {
                reasons.push("synthetic spectral patterns detected".into());
            }
            if zcr < LOW_ZCR {
                reasons.push("unnatural voice transitions".into());
            }
            // Unvoiced audio has no pitch track to judge.
            if voiced && pitch_std < FLAT_PITCH_STD_HZ {
                reasons.push("robotic pitch consistency".into());
            }
            if result.confidence > HIGH_AI_CONFIDENCE {
                reasons.push("high AI likelihood".into());
            }
        }
        Label::Human => {
            if pitch_std > LIVELY_PITCH_STD_HZ {
                reasons.push("natural pitch variations".into());
            }
            reasons.push("organic spectral characteristics".into());
            if result.confidence > HIGH_HUMAN_CONFIDENCE {
                reasons.push("strong human voice patterns".into());
            }
        }
    }
    if reasons.is_empty() {
        reasons.push(format!("model confidence: {:.1}%", result.confidence * 100.0));
    }
    reasons.join("; ")
}

use tracing::debug;

use super::keywords::normalize_keyword;
use crate::config::RiskConfig;
use crate::types::{ClassificationResult, FraudRiskAssessment, TranscriptAnalysis};

pub const ALERT_SYNTHETIC_VOICE: &str = "synthetic voice patterns detected";
pub const ALERT_HIGH_URGENCY: &str = "high urgency/pressure language detected";
pub const ALERT_LOW_RISK: &str = "low risk: natural conversation detected";

/// Combines the AI probability and transcript keywords into a 0..=100 risk score.
///
/// Pure: the same inputs and configuration always yield the same assessment.
pub fn assess_risk(
    config: &RiskConfig,
    classification: &ClassificationResult,
    transcript: &TranscriptAnalysis,
) -> FraudRiskAssessment {
    let keywords = distinct_keywords(&transcript.matched_keywords);

    let ai = (100.0 * classification.ai_probability().clamp(0.0, 1.0) as f64).round();
    let urgency = keywords
        .iter()
        .filter_map(|kw| config.category_of(kw))
        .map(|category| config.category_points.get(category))
        .sum::<f64>()
        .min(100.0);
    let keyword = (config.keyword_points * keywords.len() as f64).min(100.0);

    let mut risk = (config.ai_weight * ai
        + config.urgency_weight * urgency
        + config.keyword_weight * keyword)
        .clamp(0.0, 100.0);
    let boosted = !keywords.is_empty()
        && (ai > config.boost_ai_above || urgency > config.boost_urgency_above);
    if boosted {
        risk = (risk * config.boost_factor).min(100.0);
    }
    let risk_score = risk.round() as u8;

    let mut alerts: Vec<String> = Vec::new();
    let mut alert = |text: String| {
        if !alerts.contains(&text) {
            alerts.push(text);
        }
    };
    if ai > config.synthetic_alert_above {
        alert(ALERT_SYNTHETIC_VOICE.to_string());
    }
    if urgency > config.urgency_alert_above {
        alert(ALERT_HIGH_URGENCY.to_string());
    }
    for kw in &keywords {
        let prefix = config
            .category_of(kw)
            .map_or("suspicious keyword", |c| c.alert_prefix());
        alert(format!("{prefix}: '{kw}'"));
    }
    if alerts.is_empty() && ai < config.low_risk_ai_below {
        alerts.push(ALERT_LOW_RISK.to_string());
    }

    debug!(ai, urgency, keyword, boosted, risk_score, "scored call risk");
    FraudRiskAssessment {
        risk_score,
        risk_level: config.thresholds.level(risk_score),
        ai_detection_score: ai as u8,
        urgency_score: urgency.round() as u8,
        keyword_score: keyword.round() as u8,
        alerts,
    }
}

fn distinct_keywords(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for kw in raw {
        let kw = normalize_keyword(kw);
        if !kw.is_empty() && !out.contains(&kw) {
            out.push(kw);
        }
    }
    out
}

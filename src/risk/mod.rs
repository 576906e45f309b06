//! Call fraud risk: transcript keyword matching and the weighted risk score.

pub mod keywords;
pub mod scorer;

pub use keywords::KeywordLexicon;
pub use scorer::assess_risk;

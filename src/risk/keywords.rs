use regex::Regex;

use crate::config::KeywordRule;
use crate::error::DetectorError;

struct CompiledRule {
    keyword: String,
    pattern: Regex,
}

/// Case-insensitive whole-word matcher over a keyword lexicon. Multi-word
/// keywords tolerate any run of whitespace between their words.
pub struct KeywordLexicon {
    rules: Vec<CompiledRule>,
}

impl KeywordLexicon {
    pub fn new(rules: &[KeywordRule]) -> Result<Self, DetectorError> {
        let mut compiled: Vec<CompiledRule> = Vec::with_capacity(rules.len());
        for rule in rules {
            let keyword = normalize_keyword(&rule.keyword);
            if keyword.is_empty() {
                return Err(DetectorError::configuration("lexicon contains an empty keyword"));
            }
            if compiled.iter().any(|c| c.keyword == keyword) {
                continue;
            }
            let body = keyword
                .split(' ')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            let pattern = Regex::new(&format!(r"(?i)\b{body}\b")).map_err(|e| {
                DetectorError::configuration(format!("invalid keyword '{keyword}': {e}"))
            })?;
            compiled.push(CompiledRule {
                keyword,
                pattern,
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct matched keywords, lowercase, ordered by first occurrence in `text`.
    pub fn find(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, &str)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.pattern
                    .find(text)
                    .map(|m| (m.start(), rule.keyword.as_str()))
            })
            .collect();
        hits.sort_by_key(|&(start, _)| start);
        hits.into_iter().map(|(_, kw)| kw.to_string()).collect()
    }
}

/// Lowercase with inner whitespace collapsed to single spaces.
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

//! Query and document tokenization for sparse scoring
//!
//! Two interchangeable strategies: a morphological tokenizer over an external
//! analyzer, and a regex fallback. Selection happens once at startup via
//! [`select_tokenizer`]; it is never re-probed per request.

use crate::services::MorphAnalyzer;
use regex::Regex;
use std::sync::Arc;

/// Particles and fillers that carry no retrieval signal
const STOPWORDS: &[&str] = &[
    "있다", "없다", "하다", "되다", "경우", "그리고", "그러나", "또는", "및", "the", "a", "an",
    "of", "to", "in",
];

/// Content-morpheme POS tags kept by the morphological strategy
/// (common/proper nouns, verbs, adjectives, foreign and hanja tokens)
const CONTENT_TAGS: &[&str] = &["NNG", "NNP", "VV", "VA", "SL", "SH"];

/// Text -> ordered sequence of normalized terms
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Regex tokenizer over Hangul/Latin/digit runs; the fallback strategy
pub struct RegexTokenizer {
    pattern: Regex,
    min_length: usize,
}

impl RegexTokenizer {
    pub fn new(min_length: usize) -> Self {
        Self {
            pattern: Regex::new(r"[가-힣a-zA-Z0-9]+").expect("token pattern compiles"),
            min_length,
        }
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        self.pattern
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| t.chars().count() >= self.min_length && !STOPWORDS.contains(&t.as_str()))
            .collect()
    }
}

/// Morphological tokenizer over an external analyzer
///
/// Keeps content morphemes only. A per-call analyzer failure degrades that
/// call to the regex strategy; the one-time availability decision stays with
/// [`select_tokenizer`].
pub struct MorphTokenizer {
    analyzer: Arc<dyn MorphAnalyzer>,
    fallback: RegexTokenizer,
    min_length: usize,
}

impl MorphTokenizer {
    pub fn new(analyzer: Arc<dyn MorphAnalyzer>, min_length: usize) -> Self {
        Self {
            analyzer,
            fallback: RegexTokenizer::new(min_length),
            min_length,
        }
    }
}

impl Tokenizer for MorphTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        match self.analyzer.morphemes(text) {
            Ok(morphemes) => morphemes
                .into_iter()
                .filter(|m| CONTENT_TAGS.contains(&m.tag.as_str()))
                .map(|m| m.form.to_lowercase())
                .filter(|t| {
                    t.chars().count() >= self.min_length && !STOPWORDS.contains(&t.as_str())
                })
                .collect(),
            Err(e) => {
                tracing::warn!("morphological analysis failed, regex fallback for call: {e}");
                self.fallback.tokenize(text)
            }
        }
    }
}

/// Select the tokenization strategy once at startup
///
/// Probes the analyzer with a short sample; any probe failure pins the regex
/// strategy for the process lifetime. Logged once here, not per request.
pub fn select_tokenizer(
    analyzer: Option<Arc<dyn MorphAnalyzer>>,
    min_length: usize,
) -> Arc<dyn Tokenizer> {
    match analyzer {
        Some(analyzer) => match analyzer.morphemes("임대차 보증금 반환") {
            Ok(_) => {
                tracing::info!("using morphological tokenizer for sparse scoring");
                Arc::new(MorphTokenizer::new(analyzer, min_length))
            }
            Err(e) => {
                tracing::warn!("morphological analyzer probe failed, using regex tokenizer: {e}");
                Arc::new(RegexTokenizer::new(min_length))
            }
        },
        None => {
            tracing::info!("no morphological analyzer configured, using regex tokenizer");
            Arc::new(RegexTokenizer::new(min_length))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Morpheme;

    #[test]
    fn regex_tokenizer_splits_hangul_and_latin() {
        let tok = RegexTokenizer::new(1);
        let terms = tok.tokenize("임대인이 보증금을 반환하지 않음 (BM25 테스트)");
        assert!(terms.contains(&"임대인이".to_string()));
        assert!(terms.contains(&"bm25".to_string()));
        assert!(!terms.iter().any(|t| t.contains('(')));
    }

    #[test]
    fn regex_tokenizer_empty_input() {
        let tok = RegexTokenizer::new(1);
        assert!(tok.tokenize("").is_empty());
    }

    #[test]
    fn regex_tokenizer_min_length_filters() {
        let tok = RegexTokenizer::new(2);
        let terms = tok.tokenize("a 집 보증금");
        assert_eq!(terms, vec!["보증금".to_string()]);
    }

    struct FixedAnalyzer;

    impl MorphAnalyzer for FixedAnalyzer {
        fn morphemes(&self, _text: &str) -> anyhow::Result<Vec<Morpheme>> {
            Ok(vec![
                Morpheme {
                    form: "보증금".to_string(),
                    tag: "NNG".to_string(),
                },
                Morpheme {
                    form: "을".to_string(),
                    tag: "JKO".to_string(),
                },
                Morpheme {
                    form: "반환".to_string(),
                    tag: "NNG".to_string(),
                },
            ])
        }
    }

    struct BrokenAnalyzer;

    impl MorphAnalyzer for BrokenAnalyzer {
        fn morphemes(&self, _text: &str) -> anyhow::Result<Vec<Morpheme>> {
            anyhow::bail!("analyzer process not running")
        }
    }

    #[test]
    fn morph_tokenizer_keeps_content_tags_only() {
        let tok = MorphTokenizer::new(Arc::new(FixedAnalyzer), 1);
        assert_eq!(
            tok.tokenize("보증금을 반환"),
            vec!["보증금".to_string(), "반환".to_string()]
        );
    }

    #[test]
    fn select_falls_back_when_probe_fails() {
        let tok = select_tokenizer(Some(Arc::new(BrokenAnalyzer)), 1);
        // Regex strategy still tokenizes
        assert_eq!(tok.tokenize("보증금 반환").len(), 2);
    }

    #[test]
    fn select_uses_analyzer_when_probe_succeeds() {
        let tok = select_tokenizer(Some(Arc::new(FixedAnalyzer)), 1);
        // FixedAnalyzer ignores input; particle 을 is dropped by tag filter
        assert_eq!(tok.tokenize("anything").len(), 2);
    }
}

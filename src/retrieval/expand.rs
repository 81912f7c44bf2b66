//! Case expansion: replace partial opinions with full text
//!
//! Lookups are best-effort. Failures keep the original excerpt; order and
//! count of the document list never change here.

use crate::document::{Document, SourceType};
use crate::format::truncate_chars;
use crate::services::CaseFullText;
use std::sync::Arc;
use std::time::Duration;

pub struct CaseExpander {
    store: Arc<dyn CaseFullText>,
    timeout: Duration,
    text_max_chars: usize,
}

impl CaseExpander {
    pub fn new(store: Arc<dyn CaseFullText>, timeout: Duration, text_max_chars: usize) -> Self {
        Self {
            store,
            timeout,
            text_max_chars,
        }
    }

    /// Expand the first `top_n` case documents in place
    ///
    /// Returns the number of failed lookups (errors, timeouts, and unknown
    /// case numbers alike).
    pub async fn expand(&self, docs: &mut [Document], top_n: usize) -> usize {
        let mut attempted = 0;
        let mut failures = 0;
        for doc in docs.iter_mut() {
            if attempted >= top_n {
                break;
            }
            if doc.source_type != SourceType::Case {
                continue;
            }
            let Some(case_no) = doc.case_no.clone() else {
                continue;
            };
            attempted += 1;

            let lookup =
                tokio::time::timeout(self.timeout, self.store.full_text(&case_no)).await;
            match lookup {
                Ok(Ok(Some(full_text))) if !full_text.trim().is_empty() => {
                    doc.text = truncate_chars(full_text.trim(), self.text_max_chars);
                }
                Ok(Ok(_)) => {
                    failures += 1;
                    tracing::warn!(case_no = %case_no, "full opinion not found, keeping excerpt");
                }
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(case_no = %case_no, "case lookup failed, keeping excerpt: {e}");
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!(case_no = %case_no, "case lookup timed out, keeping excerpt");
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use ahash::AHashMap;
    use async_trait::async_trait;

    struct MapStore(AHashMap<String, String>);

    #[async_trait]
    impl CaseFullText for MapStore {
        async fn full_text(&self, case_no: &str) -> Result<Option<String>, ServiceError> {
            Ok(self.0.get(case_no).cloned())
        }
    }

    fn case(id: &str, case_no: &str) -> Document {
        Document {
            id: id.to_string(),
            chunk_id: None,
            source_type: SourceType::Case,
            src_title: "대법원 판결".to_string(),
            article: String::new(),
            text: "판시사항 발췌".to_string(),
            priority: 99,
            case_no: Some(case_no.to_string()),
        }
    }

    fn law(id: &str) -> Document {
        Document {
            id: id.to_string(),
            chunk_id: None,
            source_type: SourceType::Law,
            src_title: "주택임대차보호법".to_string(),
            article: "제3조".to_string(),
            text: "법령 본문".to_string(),
            priority: 1,
            case_no: None,
        }
    }

    #[tokio::test]
    async fn replaces_text_and_keeps_order_and_count() {
        let mut store = AHashMap::new();
        store.insert("2023다100".to_string(), "판결 전문 ".repeat(100));
        let expander = CaseExpander::new(Arc::new(MapStore(store)), Duration::from_secs(1), 50);

        let mut docs = vec![law("l1"), case("c1", "2023다100"), case("c2", "없는번호")];
        let failures = expander.expand(&mut docs, 3).await;

        assert_eq!(failures, 1);
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].id, "l1");
        assert!(docs[1].text.chars().count() <= 50);
        assert!(docs[1].text.starts_with("판결 전문"));
        // Failed lookup keeps the excerpt unchanged
        assert_eq!(docs[2].text, "판시사항 발췌");
    }

    #[tokio::test]
    async fn only_top_n_cases_are_attempted() {
        let expander = CaseExpander::new(
            Arc::new(MapStore(AHashMap::new())),
            Duration::from_secs(1),
            100,
        );
        let mut docs = vec![case("c1", "a"), case("c2", "b"), case("c3", "c")];
        let failures = expander.expand(&mut docs, 2).await;
        assert_eq!(failures, 2);
        assert_eq!(docs[2].text, "판시사항 발췌");
    }
}

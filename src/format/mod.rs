//! Hierarchical evidence assembly
//!
//! Assigns each final document to a legal-priority section, renders the
//! answer context consumed by the generation collaborator, and produces the
//! UI-facing citation list.

use crate::document::{Document, SourceType};
use ahash::AHashSet;

/// Rendering sections in fixed legal-priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    /// The user's own contract excerpt, when supplied
    UserContract = 0,
    /// Core statutes
    Statute = 1,
    /// Regulations and procedural rules
    Regulation = 2,
    /// Case law and interpretation examples
    CaseLaw = 3,
}

/// Truncate to at most `max_chars` characters, never splitting a multibyte
/// character, preferring a word boundary, with an ellipsis suffix.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars - 1).collect();
    // Back off to the last space unless the cut already landed on one
    let next_is_boundary = text
        .chars()
        .nth(max_chars - 1)
        .map(char::is_whitespace)
        .unwrap_or(true);
    if !next_is_boundary {
        if let Some(pos) = cut.rfind(char::is_whitespace) {
            cut.truncate(pos);
        }
    }
    let trimmed = cut.trim_end();
    format!("{trimmed}…")
}

/// Priority-tier to section mapping, configured per deployment
#[derive(Debug, Clone)]
pub struct SectionMap {
    statute: AHashSet<u32>,
    regulation: AHashSet<u32>,
}

impl SectionMap {
    pub fn new(statute_priorities: &[u32], regulation_priorities: &[u32]) -> Self {
        Self {
            statute: statute_priorities.iter().copied().collect(),
            regulation: regulation_priorities.iter().copied().collect(),
        }
    }

    /// Pure function of priority and source type
    pub fn section_for(&self, doc: &Document) -> Section {
        match doc.source_type {
            SourceType::UserContract => Section::UserContract,
            SourceType::Case => Section::CaseLaw,
            SourceType::Law | SourceType::Rule => {
                if self.statute.contains(&doc.priority) {
                    Section::Statute
                } else if self.regulation.contains(&doc.priority) {
                    Section::Regulation
                } else {
                    Section::CaseLaw
                }
            }
        }
    }
}

/// Renders the final evidence block and citation list
#[derive(Debug, Clone)]
pub struct HierarchyFormatter {
    section_map: SectionMap,
    text_max_chars: usize,
    contract_max_chars: usize,
}

impl HierarchyFormatter {
    pub fn new(section_map: SectionMap, text_max_chars: usize, contract_max_chars: usize) -> Self {
        Self {
            section_map,
            text_max_chars,
            contract_max_chars,
        }
    }

    /// `"{src_title} {article} - {text}"`, newlines collapsed, text truncated
    pub fn reference_line(&self, doc: &Document) -> String {
        let text = truncate_chars(doc.text.trim().replace('\n', " ").as_str(), self.text_max_chars);
        let left = Self::reference_short(doc);
        if left.is_empty() {
            text
        } else {
            format!("{left} - {text}")
        }
    }

    /// `"{src_title} {article}"`; article falls back to the case number
    pub fn reference_short(doc: &Document) -> String {
        let src_title = doc.src_title.trim();
        let mut article = doc.article.trim();
        if article.is_empty() {
            if let Some(case_no) = &doc.case_no {
                article = case_no.trim();
            }
        }
        [src_title, article]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Concatenation of non-empty sections in fixed order 0,1,2,3
    pub fn format_context(&self, docs: &[Document], contract_excerpt: Option<&str>) -> String {
        let mut statute: Vec<String> = Vec::new();
        let mut regulation: Vec<String> = Vec::new();
        let mut case_law: Vec<String> = Vec::new();

        for doc in docs {
            let entry = format!("- {}", self.reference_line(doc));
            match self.section_map.section_for(doc) {
                Section::Statute => statute.push(entry),
                Section::Regulation => regulation.push(entry),
                Section::CaseLaw | Section::UserContract => case_law.push(entry),
            }
        }

        let mut parts: Vec<String> = Vec::new();
        if let Some(excerpt) = contract_excerpt {
            let excerpt = excerpt.trim();
            if !excerpt.is_empty() {
                parts.push(format!(
                    "## [SECTION 0: 사용자 계약서 OCR (최우선 참고)]\n{}",
                    truncate_chars(excerpt, self.contract_max_chars)
                ));
            }
        }
        if !statute.is_empty() {
            parts.push(format!(
                "## [SECTION 1: 핵심 법령 (최우선 법적 근거)]\n{}",
                statute.join("\n")
            ));
        }
        if !regulation.is_empty() {
            parts.push(format!(
                "## [SECTION 2: 관련 규정 및 절차 (세부 기준)]\n{}",
                regulation.join("\n")
            ));
        }
        if !case_law.is_empty() {
            parts.push(format!(
                "## [SECTION 3: 판례 및 해석 사례 (적용 예시)]\n{}",
                case_law.join("\n")
            ));
        }

        parts.join("\n\n").trim().to_string()
    }

    /// Citation list: exact-string dedup, first-appearance order preserved
    pub fn references(docs: &[Document]) -> Vec<String> {
        let mut seen: AHashSet<String> = AHashSet::new();
        let mut out = Vec::new();
        for doc in docs {
            let reference = Self::reference_short(doc);
            if reference.is_empty() {
                continue;
            }
            if seen.insert(reference.clone()) {
                out.push(reference);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source_type: SourceType, priority: u32) -> Document {
        Document {
            id: format!("{priority}"),
            chunk_id: None,
            source_type,
            src_title: "주택임대차보호법".to_string(),
            article: "제3조".to_string(),
            text: "임차인은 주택의 인도와 주민등록을 마친 때에 대항력이 생긴다".to_string(),
            priority,
            case_no: None,
        }
    }

    fn formatter() -> HierarchyFormatter {
        HierarchyFormatter::new(SectionMap::new(&[1, 2, 4, 5], &[3, 6, 7, 8, 11]), 2500, 12000)
    }

    #[test]
    fn truncation_is_multibyte_safe() {
        let long: String = "보증금 반환 ".repeat(30); // well over 200 chars
        let out = truncate_chars(&long, 50);
        assert!(out.chars().count() <= 50);
        assert!(out.ends_with('…'));
        // Must still be valid UTF-8 by construction; also prefer word boundary
        assert!(!out.trim_end_matches('…').ends_with("반"));
    }

    #[test]
    fn truncation_leaves_short_text_alone() {
        assert_eq!(truncate_chars("짧은 텍스트", 50), "짧은 텍스트");
    }

    #[test]
    fn section_assignment_follows_priority_and_source() {
        let map = SectionMap::new(&[1, 2, 4, 5], &[3, 6, 7, 8, 11]);
        assert_eq!(map.section_for(&doc(SourceType::Law, 1)), Section::Statute);
        assert_eq!(
            map.section_for(&doc(SourceType::Rule, 3)),
            Section::Regulation
        );
        // Case documents always land in case law regardless of priority
        assert_eq!(map.section_for(&doc(SourceType::Case, 1)), Section::CaseLaw);
        // Unmapped priorities fall through to case law
        assert_eq!(map.section_for(&doc(SourceType::Law, 42)), Section::CaseLaw);
    }

    #[test]
    fn context_renders_sections_in_order() {
        let docs = vec![doc(SourceType::Case, 99), doc(SourceType::Law, 1)];
        let context = formatter().format_context(&docs, Some("특약: 원상복구 비용은 임차인 부담"));
        let s0 = context.find("SECTION 0").unwrap();
        let s1 = context.find("SECTION 1").unwrap();
        let s3 = context.find("SECTION 3").unwrap();
        assert!(s0 < s1 && s1 < s3);
        assert!(!context.contains("SECTION 2"));
    }

    #[test]
    fn references_dedup_preserving_order() {
        let mut case = doc(SourceType::Case, 99);
        case.article = String::new();
        case.case_no = Some("2023다12345".to_string());
        let docs = vec![
            doc(SourceType::Law, 1),
            doc(SourceType::Law, 1), // identical citation string
            case,
        ];
        let refs = HierarchyFormatter::references(&docs);
        assert_eq!(
            refs,
            vec![
                "주택임대차보호법 제3조".to_string(),
                "주택임대차보호법 2023다12345".to_string(),
            ]
        );
    }

    #[test]
    fn reference_line_collapses_newlines() {
        let mut d = doc(SourceType::Law, 1);
        d.text = "첫 줄\n둘째 줄".to_string();
        let line = formatter().reference_line(&d);
        assert!(line.contains("첫 줄 둘째 줄"));
        assert!(line.starts_with("주택임대차보호법 제3조 - "));
    }
}

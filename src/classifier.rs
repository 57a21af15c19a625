/// Flags postings whose text mentions any configured keyword.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        KeywordClassifier {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_high_value(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.keywords.iter().any(|k| text_lower.contains(k.as_str()))
    }
}

/// Case-insensitive substring match against any keyword.
pub fn classify<S: AsRef<str>>(text: &str, keywords: &[S]) -> bool {
    KeywordClassifier::new(keywords).is_high_value(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_keyword() {
        assert!(classify("Vaga JIT na Scania", &["JIT", "SAP"]));
        assert!(!classify("vaga qualquer", &["JIT", "SAP"]));
    }

    #[test]
    fn ignores_case() {
        assert!(classify("experiência com sap mm", &["SAP"]));
        assert!(classify("LEAN MANUFACTURING", &["Lean"]));
    }

    #[test]
    fn blank_keywords_never_match() {
        let classifier = KeywordClassifier::new(["", "  "]);
        assert!(!classifier.is_high_value("anything at all"));
    }
}

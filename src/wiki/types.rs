use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Section label for text that precedes the first heading.
pub const OVERVIEW: &str = "Overview";

/// Normalized Wikipedia lookup result. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeResult {
    pub title: String,
    /// Intro extract. Empty means no usable article was found.
    pub summary: String,
    /// Section label → plain text.
    pub sections: HashMap<String, String>,
    /// Related article titles, most relevant first.
    pub suggestions: Vec<String>,
}

impl KnowledgeResult {
    /// A "no article" result for `topic`.
    pub fn empty(topic: &str) -> Self {
        Self {
            title: topic.to_string(),
            ..Default::default()
        }
    }

    /// Render as the context block handed to the prompt composer.
    ///
    /// `Overview` comes first, other sections follow in label order, each
    /// truncated to `max_section_chars`.
    pub fn to_context(&self, max_section_chars: usize) -> String {
        let mut out = format!("Title: {}\nSummary: {}", self.title, self.summary.trim());

        let mut labels: Vec<&String> = self
            .sections
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(label, _)| label)
            .collect();
        // Case-insensitive order; the exact label breaks ties like "History"/"history".
        labels.sort_by(|a, b| {
            let rank = |label: &str| (label != OVERVIEW, label.to_lowercase());
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });

        for label in labels {
            let text = truncate(self.sections[label].trim(), max_section_chars);
            out.push_str(&format!("\n\n{}:\n{}", label, text));
        }

        if !self.suggestions.is_empty() {
            out.push_str(&format!("\n\nRelated topics: {}", self.suggestions.join(", ")));
        }

        out
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KnowledgeResult {
        KnowledgeResult {
            title: "Photosynthesis".to_string(),
            summary: "Photosynthesis is a process.".to_string(),
            sections: HashMap::from([
                ("Overview".to_string(), "Plants use light.".to_string()),
                ("Evolution".to_string(), "Early organisms.".to_string()),
                ("Discovery".to_string(), "  ".to_string()),
            ]),
            suggestions: vec!["Chlorophyll".to_string(), "Calvin cycle".to_string()],
        }
    }

    #[test]
    fn test_context_layout() {
        let ctx = sample().to_context(2000);
        assert_eq!(
            ctx,
            "Title: Photosynthesis\nSummary: Photosynthesis is a process.\n\n\
             Overview:\nPlants use light.\n\n\
             Evolution:\nEarly organisms.\n\n\
             Related topics: Chlorophyll, Calvin cycle"
        );
    }

    #[test]
    fn test_context_skips_empty_sections() {
        let ctx = sample().to_context(2000);
        assert!(!ctx.contains("Discovery"));
    }

    #[test]
    fn test_context_truncates_sections() {
        let mut result = sample();
        result
            .sections
            .insert("Overview".to_string(), "é".repeat(50));
        let ctx = result.to_context(10);
        assert!(ctx.contains(&format!("Overview:\n{}…", "é".repeat(10))));
    }

    #[test]
    fn test_context_orders_case_variants_stably() {
        let mut result = sample();
        result.suggestions.clear();
        result
            .sections
            .insert("history".to_string(), "lower".to_string());
        result
            .sections
            .insert("History".to_string(), "upper".to_string());

        let ctx = result.to_context(2000);
        let upper = ctx.find("History:\nupper").unwrap();
        let lower = ctx.find("history:\nlower").unwrap();
        assert!(upper < lower);
        assert_eq!(ctx, result.clone().to_context(2000));
    }

    #[test]
    fn test_empty_result() {
        let result = KnowledgeResult::empty("Xyzzy");
        assert_eq!(result.title, "Xyzzy");
        assert!(result.summary.is_empty());
        assert!(result.sections.is_empty());
    }
}

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::types::OVERVIEW;

/// `== Heading ==` through `====== Heading ======` on its own line.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(={2,6})\s*(.+?)\s*={2,6}\s*$").unwrap());

/// Reference and navigation sections carry no prose worth prompting with.
const SKIPPED_SECTIONS: &[&str] = &[
    "see also",
    "references",
    "external links",
    "further reading",
    "notes",
    "sources",
    "bibliography",
    "citations",
];

/// Split a plain-text extract (`exsectionformat=wiki`) into labeled sections.
///
/// Text before the first heading becomes `Overview`. Repeated labels are
/// concatenated, empty and boilerplate sections are dropped.
pub fn split_sections(extract: &str) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut label = OVERVIEW.to_string();
    let mut last_end = 0;

    for caps in HEADING_RE.captures_iter(extract) {
        let Some(whole) = caps.get(0) else { continue };
        insert(&mut sections, &label, &extract[last_end..whole.start()]);
        label = caps[2].trim().to_string();
        last_end = whole.end();
    }
    insert(&mut sections, &label, &extract[last_end..]);

    sections
}

fn insert(sections: &mut HashMap<String, String>, label: &str, text: &str) {
    let text = text.trim();
    if text.is_empty() || SKIPPED_SECTIONS.contains(&label.to_lowercase().as_str()) {
        return;
    }
    sections
        .entry(label.to_string())
        .and_modify(|existing| {
            existing.push_str("\n\n");
            existing.push_str(text);
        })
        .or_insert_with(|| text.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sections() {
        let extract = "Rust is a language.\n\n== History ==\nStarted in 2006.\n\n\
                       === Mozilla ===\nSponsored by Mozilla.\n\n== See also ==\nC++\n";
        let sections = split_sections(extract);
        assert_eq!(sections["Overview"], "Rust is a language.");
        assert_eq!(sections["History"], "Started in 2006.");
        assert_eq!(sections["Mozilla"], "Sponsored by Mozilla.");
        assert!(!sections.contains_key("See also"));
        assert_eq!(sections.len(), 3);
    }

    #[test]
    fn test_empty_heading_bodies_dropped() {
        let extract = "Intro.\n== Empty ==\n\n== Filled ==\nBody.";
        let sections = split_sections(extract);
        assert!(!sections.contains_key("Empty"));
        assert_eq!(sections["Filled"], "Body.");
    }

    #[test]
    fn test_repeated_labels_concatenate() {
        let extract = "== Uses ==\nFirst.\n== Uses ==\nSecond.";
        let sections = split_sections(extract);
        assert_eq!(sections["Uses"], "First.\n\nSecond.");
        assert!(!sections.contains_key("Overview"));
    }

    #[test]
    fn test_no_headings() {
        let sections = split_sections("Just one paragraph.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["Overview"], "Just one paragraph.");
    }
}

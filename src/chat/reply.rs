use std::sync::LazyLock;

use regex::Regex;

// Best-effort: the model may ignore the tag convention, so `parse` never fails.
static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<reasoning>(.*?)</reasoning>").unwrap());
static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<answer>(.*?)</answer>").unwrap());

/// A model reply split into its answer and reasoning trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    /// Empty when the model gave no reasoning block.
    pub reasoning: String,
}

impl ModelReply {
    /// Extract `<reasoning>` and `<answer>` blocks. Without an answer block the
    /// whole trimmed text is the answer.
    pub fn parse(raw: &str) -> Self {
        let reasoning = REASONING_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let content = ANSWER_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .unwrap_or_else(|| raw.trim())
            .to_string();

        Self { content, reasoning }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_blocks() {
        let raw = "<reasoning>\n- step one\n- step two\n</reasoning>\n\n<answer>\n 42 \n</answer>";
        let reply = ModelReply::parse(raw);
        assert_eq!(reply.reasoning, "- step one\n- step two");
        assert_eq!(reply.content, "42");
    }

    #[test]
    fn test_parse_any_order_with_noise() {
        let raw = "Sure!\n<ANSWER>Paris</ANSWER> trailing <Reasoning>capital of France</Reasoning> bye";
        let reply = ModelReply::parse(raw);
        assert_eq!(reply.content, "Paris");
        assert_eq!(reply.reasoning, "capital of France");
    }

    #[test]
    fn test_parse_non_greedy() {
        let raw = "<answer>first</answer> middle <answer>second</answer>";
        assert_eq!(ModelReply::parse(raw).content, "first");
    }

    #[test]
    fn test_parse_fallback_whole_text() {
        let raw = "  Just a plain reply.\nWith two lines.  ";
        let reply = ModelReply::parse(raw);
        assert_eq!(reply.content, "Just a plain reply.\nWith two lines.");
        assert_eq!(reply.reasoning, "");
    }

    #[test]
    fn test_parse_reasoning_without_answer() {
        let raw = "<reasoning>thinking</reasoning> The answer is 7.";
        let reply = ModelReply::parse(raw);
        assert_eq!(reply.reasoning, "thinking");
        assert_eq!(reply.content, raw.trim());
    }

    #[test]
    fn test_parse_unclosed_answer_falls_back() {
        let raw = "<answer>never closed";
        assert_eq!(ModelReply::parse(raw).content, "<answer>never closed");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ModelReply::parse(""), ModelReply::default());
    }
}

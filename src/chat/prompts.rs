pub const SYSTEM_DIRECTIVE: &str = r#"You are a helpful assistant that thinks step by step before answering.
When responding to questions, use the following format:

<reasoning>
- First, think about what's being asked
- Break down the question into logical steps
- Consider multiple perspectives or approaches
- Check for any potential errors or misunderstandings
- Arrive at a well-reasoned conclusion
</reasoning>

<answer>
Your final, clear, and concise answer goes here.
</answer>

Always show your reasoning before providing an answer. When context information
from Wikipedia is provided, prefer it over your own recollection and say so if it
does not cover the question."#;

/// Fixed reply stored when generation fails.
pub const APOLOGY: &str =
    "I apologize, but I'm having trouble processing that request. Could you please try again?";

/// Build the final prompt. A blank `knowledge_context` omits the context section.
pub fn compose(system_directive: &str, knowledge_context: &str, user_question: &str) -> String {
    let knowledge_context = knowledge_context.trim();
    if knowledge_context.is_empty() {
        format!("{}\n\nUser question: {}", system_directive, user_question)
    } else {
        format!(
            "{}\n\nContext information: {}\n\nUser question: {}",
            system_directive, knowledge_context, user_question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_with_context() {
        let prompt = compose("SYS", "Title: Rust", "what is rust?");
        assert_eq!(
            prompt,
            "SYS\n\nContext information: Title: Rust\n\nUser question: what is rust?"
        );
    }

    #[test]
    fn test_compose_without_context() {
        let prompt = compose("SYS", "", "hi");
        assert_eq!(prompt, "SYS\n\nUser question: hi");
        assert!(!prompt.contains("Context information"));
    }

    #[test]
    fn test_compose_blank_context_omitted() {
        assert_eq!(compose("SYS", " \n ", "hi"), compose("SYS", "", "hi"));
    }

    #[test]
    fn test_compose_deterministic() {
        let a = compose(SYSTEM_DIRECTIVE, "ctx", "q");
        let b = compose(SYSTEM_DIRECTIVE, "ctx", "q");
        assert_eq!(a, b);
    }

    #[test]
    fn test_directive_names_both_blocks() {
        assert!(SYSTEM_DIRECTIVE.contains("<reasoning>"));
        assert!(SYSTEM_DIRECTIVE.contains("<answer>"));
    }
}

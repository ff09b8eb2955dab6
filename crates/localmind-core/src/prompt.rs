//! ============================================================================
//! System Prompt - Base instructions plus recalled context
//! ============================================================================

/// Base system prompt of the local assistant
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, respectful, and honest AI assistant running locally on the user's device. You prioritize privacy and concise, accurate answers.";

/// Prepend a recalled context block to the base prompt.
/// An empty context leaves the base prompt unchanged.
pub fn build_system_prompt(base: &str, context: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        return base.to_string();
    }

    format!("{}\n\n{}", context, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CONTEXT_HEADER;

    #[test]
    fn test_empty_context_keeps_base() {
        assert_eq!(
            build_system_prompt(DEFAULT_SYSTEM_PROMPT, ""),
            DEFAULT_SYSTEM_PROMPT
        );
        assert_eq!(build_system_prompt("base", "  \n "), "base");
    }

    #[test]
    fn test_context_comes_first() {
        let context = format!("\n{}\n[1/1/2024] USER: I like hiking\n\n", CONTEXT_HEADER);
        let prompt = build_system_prompt("base", &context);

        assert!(prompt.starts_with(CONTEXT_HEADER));
        assert!(prompt.ends_with("USER: I like hiking\n\nbase"));
    }
}

//! Prompt assembly.
//!
//! The template is a plain string with `{context}` and `{question}`
//! placeholders. Context is never truncated.

use crate::models::IndexMatch;

/// Join match texts with a blank line, or return `empty_context` when there
/// are no matches.
pub fn build_context(matches: &[IndexMatch], empty_context: &str) -> String {
    if matches.is_empty() {
        return empty_context.to_string();
    }
    matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitute `{context}` and `{question}` in one pass over the template.
/// Substituted text is never scanned again.
pub fn render(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROMPT_TEMPLATE;

    fn hit(text: &str) -> IndexMatch {
        IndexMatch {
            id: "x".to_string(),
            text: text.to_string(),
            source: "x.txt".to_string(),
            distance: None,
        }
    }

    #[test]
    fn test_default_template() {
        let prompt = render(DEFAULT_PROMPT_TEMPLATE, "cats are great", "tell me about cats");
        assert_eq!(
            prompt,
            "Using the following context, answer the user's question.\n\n\
             Context: cats are great\n\n\
             Question: tell me about cats"
        );
    }

    #[test]
    fn test_context_joined_with_blank_line() {
        let ctx = build_context(&[hit("one"), hit("two"), hit("three")], "none");
        assert_eq!(ctx, "one\n\ntwo\n\nthree");
    }

    #[test]
    fn test_empty_context_placeholder() {
        assert_eq!(
            build_context(&[], "No relevant context found."),
            "No relevant context found."
        );
    }

    #[test]
    fn test_unknown_braces_kept() {
        assert_eq!(render("{x} {context}", "c", "q"), "{x} c");
    }

    #[test]
    fn test_placeholders_in_user_text_left_alone() {
        let prompt = render("Q: {question} C: {context}", "ctx", "what is {context}?");
        assert_eq!(prompt, "Q: what is {context}? C: ctx");
    }
}

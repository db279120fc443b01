//! Aspect prompts.
//!
//! Every prompt pins the response grammar: a leading declaration block
//! (`LABEL: YES|NO`), optional machine-readable lines, then plain prose.
//! The schemas here are the single source of truth for which labels each
//! aspect must declare.

use crate::generation::Prompt;
use crate::models::Aspect;
use crate::verdict::VerdictSchema;

pub const SUMMARY_LABEL: &str = "SUMMARY_OK";
pub const SCAM_LABEL: &str = "SCAM";
pub const SUBJECTIVE_LABEL: &str = "SUBJECTIVE";
pub const BIASED_LABEL: &str = "BIASED";

/// Bias categories the model is asked to score.
pub const BIAS_CATEGORIES: &[&str] = &[
    "political_left",
    "political_right",
    "emotional_appeal",
    "loaded_language",
    "gender",
    "racial",
    "corporate",
];

const SYSTEM: &str = "You are a media literacy assistant. Write for a general audience in plain, \
calm language. Always follow the response format exactly; the first lines are parsed by a program.";

pub fn schema_for(aspect: Aspect) -> VerdictSchema {
    match aspect {
        Aspect::Summary => VerdictSchema::new(&[SUMMARY_LABEL]),
        Aspect::Scam => VerdictSchema::new(&[SCAM_LABEL]),
        Aspect::Subjectivity => VerdictSchema::new(&[SUBJECTIVE_LABEL]),
        Aspect::Bias => VerdictSchema::new(&[BIASED_LABEL]),
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build(aspect: Aspect, content: &str, max_chars: usize, summary_sentences: usize) -> Prompt {
    let text = excerpt(content, max_chars);
    let instructions = match aspect {
        Aspect::Summary => format!(
            "Summarize the text below in approximately {n} sentences.\n\
             Response format:\n\
             {label}: YES\n\
             <the summary, nothing else>\n\
             If the text cannot be summarized, answer `{label}: NO` followed by the reason.",
            n = summary_sentences.max(1),
            label = SUMMARY_LABEL,
        ),
        Aspect::Scam => format!(
            "Decide whether the text below is a scam or phishing attempt.\n\
             Response format:\n\
             {label}: YES or {label}: NO\n\
             CONFIDENCE: <number between 0 and 1 for your answer>\n\
             <2-3 sentences explaining whether the content is safe or suspicious and what the reader should do>",
            label = SCAM_LABEL,
        ),
        Aspect::Subjectivity => format!(
            "Decide whether the text below is primarily subjective (opinion-based) rather than objective (fact-based).\n\
             Response format:\n\
             {label}: YES or {label}: NO\n\
             CONFIDENCE: <number between 0 and 1 for your answer>\n\
             <2-3 sentences explaining what this means for the reader>",
            label = SUBJECTIVE_LABEL,
        ),
        Aspect::Bias => format!(
            "Assess the text below for bias. Score each category from 0 to 1.\n\
             Categories: {cats}.\n\
             Response format:\n\
             {label}: YES or {label}: NO\n\
             SCORE <category>: <number>   (one line per category)\n\
             <2-3 sentences explaining the bias patterns found, or their absence. \
             Do not describe promotional tone or writing style.>",
            cats = BIAS_CATEGORIES.join(", "),
            label = BIASED_LABEL,
        ),
    };

    Prompt {
        system: SYSTEM.to_string(),
        user: format!("{}\n\nTEXT:\n{}", instructions, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("abc", 10), "abc");
    }

    #[test]
    fn prompt_embeds_content_and_label() {
        let p = build(Aspect::Scam, "Send bitcoin now", 100, 3);
        assert!(p.user.contains("Send bitcoin now"));
        assert!(p.user.contains("SCAM: YES or SCAM: NO"));
    }

    #[test]
    fn bias_prompt_lists_categories() {
        let p = build(Aspect::Bias, "text", 100, 3);
        for cat in BIAS_CATEGORIES {
            assert!(p.user.contains(cat));
        }
    }

    #[test]
    fn content_is_truncated() {
        let long = "x".repeat(50);
        let p = build(Aspect::Summary, &long, 10, 3);
        assert!(p.user.ends_with(&"x".repeat(10)));
        assert!(!p.user.contains(&"x".repeat(11)));
    }
}

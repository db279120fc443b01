//! Strict parser for the verdict block at the top of generated text.
//!
//! The text-generation service is asked to open every response with one or
//! more declaration lines of the form `LABEL: YES` / `LABEL: NO`, followed by
//! free-form explanation:
//!
//! ```text
//! SCAM: YES
//! The message asks for a gift card payment...
//! ```
//!
//! Only the leading run of declaration lines is inspected. The first line
//! that is not a declaration ends the block, and everything from there on is
//! returned verbatim as notes. A label that appears only in the explanation
//! is never picked up.

use std::collections::BTreeMap;

/// Labels an aspect requires in its declaration block.
#[derive(Debug, Clone, Copy)]
pub struct VerdictSchema {
    pub required: &'static [&'static str],
}

impl VerdictSchema {
    pub const fn new(required: &'static [&'static str]) -> Self {
        Self { required }
    }
}

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    pub labels: BTreeMap<String, bool>,
    /// Text following the declaration block, unmodified.
    pub notes: String,
}

impl ParsedVerdict {
    pub fn flag(&self, label: &str) -> Option<bool> {
        self.labels.get(label).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerdictError {
    #[error("response does not start with a verdict declaration")]
    EmptyBlock,
    #[error("verdict block is missing required label {0}")]
    MissingLabel(String),
    #[error("verdict block declares {0} more than once")]
    DuplicateLabel(String),
}

/// Parse the leading declaration block of `text` against `schema`.
pub fn parse(text: &str, schema: &VerdictSchema) -> Result<ParsedVerdict, VerdictError> {
    let mut labels = BTreeMap::new();
    let mut rest = text;

    // Blank lines before the first declaration are tolerated.
    while let Some(i) = rest.find('\n') {
        if !rest[..i].trim().is_empty() {
            break;
        }
        rest = &rest[i + 1..];
    }

    while !rest.is_empty() {
        let (line, remainder) = split_line(rest);
        match parse_declaration(line) {
            Some((label, value)) => {
                if labels.insert(label.clone(), value).is_some() {
                    return Err(VerdictError::DuplicateLabel(label));
                }
                rest = remainder;
            }
            None => break,
        }
    }

    if labels.is_empty() {
        return Err(VerdictError::EmptyBlock);
    }
    for label in schema.required {
        if !labels.contains_key(*label) {
            return Err(VerdictError::MissingLabel((*label).to_string()));
        }
    }

    Ok(ParsedVerdict {
        labels,
        notes: rest.to_string(),
    })
}

/// Split off the first line, consuming its terminator.
fn split_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

/// Match `LABEL: YES|NO`. Labels are upper-case ASCII, digits, and underscores,
/// starting with a letter. The value is case-insensitive.
fn parse_declaration(line: &str) -> Option<(String, bool)> {
    let line = line.trim();
    let (label, value) = line.split_once(':')?;
    let label = label.trim();
    let mut chars = label.chars();
    if !chars.next()?.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
        return None;
    }
    let value = match value.trim().to_ascii_uppercase().as_str() {
        "YES" => true,
        "NO" => false,
        _ => return None,
    };
    Some((label.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCAM: VerdictSchema = VerdictSchema::new(&["SCAM"]);
    const TWO: VerdictSchema = VerdictSchema::new(&["SCAM", "URGENT"]);

    #[test]
    fn recovers_booleans_and_notes_verbatim() {
        let text = "SCAM: YES\nURGENT: no\nThe sender asks for gift cards.\n\n  Indented line stays.";
        let parsed = parse(text, &TWO).unwrap();
        assert_eq!(parsed.flag("SCAM"), Some(true));
        assert_eq!(parsed.flag("URGENT"), Some(false));
        assert_eq!(
            parsed.notes,
            "The sender asks for gift cards.\n\n  Indented line stays."
        );
    }

    #[test]
    fn missing_label_fails_without_default() {
        let err = parse("SCAM: NO\nLooks fine.", &TWO).unwrap_err();
        assert_eq!(err, VerdictError::MissingLabel("URGENT".to_string()));
    }

    #[test]
    fn label_only_in_body_is_not_used() {
        // URGENT appears after the block ended, so it must not count.
        let err = parse("SCAM: NO\nNothing odd here.\nURGENT: YES", &TWO).unwrap_err();
        assert_eq!(err, VerdictError::MissingLabel("URGENT".to_string()));
    }

    #[test]
    fn no_declarations_is_empty_block() {
        let err = parse("This is not a scam.", &SCAM).unwrap_err();
        assert_eq!(err, VerdictError::EmptyBlock);
        assert_eq!(parse("", &SCAM).unwrap_err(), VerdictError::EmptyBlock);
    }

    #[test]
    fn negated_mention_in_notes_is_ignored() {
        let parsed = parse("SCAM: NO\nThis is not SCAM: YES territory.", &SCAM).unwrap();
        assert_eq!(parsed.flag("SCAM"), Some(false));
        assert_eq!(parsed.notes, "This is not SCAM: YES territory.");
    }

    #[test]
    fn leading_blank_lines_are_skipped() {
        let parsed = parse("\n\n  SCAM: YES  \nBecause.", &SCAM).unwrap();
        assert_eq!(parsed.flag("SCAM"), Some(true));
        assert_eq!(parsed.notes, "Because.");
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let err = parse("SCAM: YES\nSCAM: NO\n", &SCAM).unwrap_err();
        assert_eq!(err, VerdictError::DuplicateLabel("SCAM".to_string()));
    }

    #[test]
    fn block_only_yields_empty_notes() {
        let parsed = parse("SCAM: YES", &SCAM).unwrap();
        assert_eq!(parsed.notes, "");
    }

    #[test]
    fn extra_labels_are_kept() {
        let parsed = parse("SCAM: NO\nPHISHING: YES\nok", &SCAM).unwrap();
        assert_eq!(parsed.flag("PHISHING"), Some(true));
    }

    #[test]
    fn lowercase_label_ends_block() {
        let err = parse("scam: yes\n", &SCAM).unwrap_err();
        assert_eq!(err, VerdictError::EmptyBlock);
    }
}

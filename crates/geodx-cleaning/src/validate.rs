//! Step 6: final validation.
//!
//! Rule checks over the cleaned record. A failing rule never discards the
//! record — violations surface as issues for the quality score and
//! warnings in the report.

use crate::extract::MAX_LEN;

pub(crate) struct ValidationOutcome {
    pub is_valid: bool,
    pub violations: Vec<&'static str>,
}

pub(crate) fn validate(text: &str) -> ValidationOutcome {
    let mut violations = Vec::new();

    if text.trim().is_empty() {
        violations.push("non_empty");
    }
    if text.chars().count() > MAX_LEN {
        violations.push("under_max_length");
    }
    if text
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        violations.push("no_control_chars");
    }

    ValidationOutcome {
        is_valid: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_passes_all_rules() {
        let outcome = validate("Acme Water is a brand.");
        assert!(outcome.is_valid);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn empty_text_violates_non_empty() {
        let outcome = validate("   ");
        assert!(!outcome.is_valid);
        assert_eq!(outcome.violations, vec!["non_empty"]);
    }

    #[test]
    fn control_characters_are_flagged() {
        let outcome = validate("bad\u{0000}text");
        assert!(!outcome.is_valid);
        assert!(outcome.violations.contains(&"no_control_chars"));
    }

    #[test]
    fn newlines_and_tabs_are_allowed() {
        let outcome = validate("line one\nline two\tend\r\n");
        assert!(outcome.is_valid);
    }

    #[test]
    fn over_long_text_is_flagged() {
        let outcome = validate(&"a".repeat(MAX_LEN + 1));
        assert!(outcome.violations.contains(&"under_max_length"));
    }
}

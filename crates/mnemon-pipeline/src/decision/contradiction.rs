//! Syntactic contradiction detection: negation markers and antonym
//! pairs against candidates with sufficient lexical overlap.

use std::collections::HashSet;

const NEGATION_MARKERS: &[&str] = &[
    "not", "no", "never", "none", "cannot", "cant", "dont", "doesnt", "didnt", "wont",
    "isnt", "arent", "wasnt", "stopped", "longer",
];

const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("enable", "disable"),
    ("enabled", "disabled"),
    ("on", "off"),
    ("always", "never"),
    ("prefers", "dislikes"),
    ("likes", "dislikes"),
    ("allow", "forbid"),
    ("allowed", "forbidden"),
    ("start", "stop"),
    ("increase", "decrease"),
    ("before", "after"),
    ("add", "remove"),
];

/// Lowercased alphanumeric tokens, stop-marker words included.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of shared tokens, negation markers excluded so "not X" still
/// overlaps "X" on substance.
pub fn lexical_overlap(a: &str, b: &str) -> usize {
    let ta = tokenize(a);
    let tb = tokenize(b);
    ta.intersection(&tb)
        .filter(|t| !NEGATION_MARKERS.contains(&t.as_str()))
        .count()
}

/// True when the statements look like direct opposites: one negates
/// what the other asserts, or they pivot on an antonym pair.
pub fn syntactic_contradiction(existing: &str, incoming: &str) -> bool {
    let ta = tokenize(existing);
    let tb = tokenize(incoming);

    let neg_a = ta.iter().any(|t| NEGATION_MARKERS.contains(&t.as_str()));
    let neg_b = tb.iter().any(|t| NEGATION_MARKERS.contains(&t.as_str()));
    if neg_a != neg_b {
        return true;
    }

    for (left, right) in ANTONYM_PAIRS {
        let a_left = ta.contains(*left);
        let a_right = ta.contains(*right);
        let b_left = tb.contains(*left);
        let b_right = tb.contains(*right);
        if (a_left && b_right && !a_right && !b_left)
            || (a_right && b_left && !a_left && !b_right)
        {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_ignores_negation_markers() {
        let overlap = lexical_overlap(
            "User does not prefer dark mode editor",
            "User prefers dark mode editor",
        );
        assert!(overlap >= 3, "overlap {overlap}");
    }

    #[test]
    fn test_negation_flip_detected() {
        assert!(syntactic_contradiction(
            "User does not prefer dark mode editor",
            "User prefers dark mode editor",
        ));
        assert!(!syntactic_contradiction(
            "User prefers dark mode editor",
            "User prefers dark mode terminal",
        ));
    }

    #[test]
    fn test_antonym_pair_detected() {
        assert!(syntactic_contradiction(
            "Telemetry is enabled on the build server",
            "Telemetry is disabled on the build server",
        ));
    }

    #[test]
    fn test_double_negation_is_not_contradiction() {
        assert!(!syntactic_contradiction(
            "User does not use tabs",
            "User does not use tabs for indentation",
        ));
    }
}

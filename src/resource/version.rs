//! Natural ordering of free-text version labels.
//!
//! Labels are split into digit and non-digit runs; digit runs compare
//! numerically, everything else case-insensitively. `"1.10"` sorts after
//! `"1.9"`, `"v2"` after `"v1"`. Labels are only used to decide where a new
//! member enters a chain; the chain itself defines the order afterwards.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Text(String),
}

fn segments(label: &str) -> Vec<Segment<'_>> {
    let label = label.trim();
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (idx, c) in label.char_indices() {
        let is_digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != is_digit => {
                out.push(segment(&label[start..idx], prev));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(prev) = in_digits {
        out.push(segment(&label[start..], prev));
    }
    out
}

fn segment(run: &str, digits: bool) -> Segment<'_> {
    if digits {
        let trimmed = run.trim_start_matches('0');
        Segment::Number(if trimmed.is_empty() { "0" } else { trimmed })
    } else {
        Segment::Text(run.to_lowercase())
    }
}

fn compare_segment(a: &Segment<'_>, b: &Segment<'_>) -> Ordering {
    match (a, b) {
        // No leading zeros: longer means larger, then lexical.
        (Segment::Number(x), Segment::Number(y)) => x.len().cmp(&y.len()).then_with(|| x.cmp(y)),
        (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
        (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
        (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
    }
}

/// Compare two version labels naturally.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (segments(a), segments(b));
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare_segment(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(compare_versions("1.9", "1.10"), Ordering::Less);
        assert_eq!(compare_versions("10", "9"), Ordering::Greater);
        assert_eq!(compare_versions("2", "2"), Ordering::Equal);
    }

    #[test]
    fn leading_zeros_and_case_are_ignored() {
        assert_eq!(compare_versions("01", "1"), Ordering::Equal);
        assert_eq!(compare_versions("V2", "v2"), Ordering::Equal);
        assert_eq!(compare_versions(" 3 ", "3"), Ordering::Equal);
    }

    #[test]
    fn prefixes_and_suffixes() {
        assert_eq!(compare_versions("v1", "v2"), Ordering::Less);
        assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare_versions("1.0-beta", "1.0"), Ordering::Greater);
    }

    #[test]
    fn sorting_a_list() {
        let mut labels = vec!["1.10", "1.2", "0.9", "1.2.1", "2"];
        labels.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(labels, vec!["0.9", "1.2", "1.2.1", "1.10", "2"]);
    }
}

//! Numeric text parsing
//!
//! Turns free-form UI text ("$1,250.00", "WIN: 80 credits") into a number.
//! Every character that is not an ASCII digit or a decimal point is dropped
//! before conversion. Thousands separators are not locale aware: a comma is
//! stripped like any other decoration, so "1.250,00" reads as 1.25.

use crate::dom::{Document, NodeId};

/// Extract a numeric value from arbitrary text
///
/// Returns `None` when nothing numeric survives stripping. When the stripped
/// text carries more than one decimal point, the longest valid prefix is used
/// ("1.2.3" reads as 1.2).
pub fn parse_number(text: &str) -> Option<f64> {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let numeric = match stripped.match_indices('.').nth(1) {
        Some((second_dot, _)) => &stripped[..second_dot],
        None => stripped.as_str(),
    };

    if !numeric.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    numeric.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Read and parse the text content of a node, if the node exists
pub fn read_number<D: Document + ?Sized>(document: &D, node: Option<NodeId>) -> Option<f64> {
    node.and_then(|node| document.text_content(node))
        .and_then(|text| parse_number(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integer() {
        assert_eq!(parse_number("1000"), Some(1000.0));
    }

    #[test]
    fn test_currency_and_whitespace() {
        assert_eq!(parse_number("  $ 12.50 "), Some(12.5));
        assert_eq!(parse_number("WIN: 80 credits"), Some(80.0));
    }

    #[test]
    fn test_thousands_separator_stripped() {
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
    }

    #[test]
    fn test_comma_decimal_limitation() {
        // "1.250,00" strips to "1.25000"
        assert_eq!(parse_number("$1.250,00 credits"), Some(1.25));
    }

    #[test]
    fn test_no_digits_is_absent() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("---"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("..."), None);
    }

    #[test]
    fn test_multiple_dots_use_prefix() {
        assert_eq!(parse_number("1.2.3"), Some(1.2));
        assert_eq!(parse_number("v2.0.1"), Some(2.0));
    }

    #[test]
    fn test_leading_and_trailing_dot() {
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("7."), Some(7.0));
    }

    #[test]
    fn test_negative_sign_is_decoration() {
        assert_eq!(parse_number("-50"), Some(50.0));
    }

    #[test]
    fn test_idempotent() {
        let samples = ["$1,000", "abc", "0.00", "1.2.3", "€ 9,99", ""];
        for sample in samples {
            assert_eq!(parse_number(sample), parse_number(sample));
        }
    }

    #[test]
    fn test_decorations_preserve_value() {
        for decorated in ["<b>42</b>", "42 EUR", "≈42", "[42]"] {
            assert_eq!(parse_number(decorated), Some(42.0), "input {decorated:?}");
        }
    }
}

//! Stable identifiers for graph nodes.
//!
//! Node ids are a pure function of the model name so that every engine
//! writing a node for the same model lands on the same id and merges
//! instead of duplicating. The hash matches the front-end's string hash
//! (the classic `h*31 + c` JavaScript form) so existing layouts keep
//! working: mix as unsigned 32-bit, reinterpret as signed, take the
//! absolute value, render as decimal.

/// Deterministic 32-bit string hash rendered as a decimal string.
pub fn node_id(s: &str) -> String {
    let mut h: u32 = 0;
    for c in s.chars() {
        h = (h << 5).wrapping_sub(h).wrapping_add(c as u32);
    }
    (h as i32).unsigned_abs().to_string()
}

/// Case-insensitive membership test used when matching requested
/// columns against dbt-declared columns.
pub fn contains_fold(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|c| c.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a", "97")]
    #[case("ab", "3105")]
    #[case("", "0")]
    fn test_node_id_known_values(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(node_id(input), expected);
    }

    #[test]
    fn test_node_id_is_deterministic() {
        for s in ["orders", "stg_orders", "fct_daily_orders", "日本語"] {
            assert_eq!(node_id(s), node_id(s));
        }
    }

    #[test]
    fn test_node_id_abs_of_signed_reinterpretation() {
        // Long strings overflow into the sign bit; the rendered id must
        // still be a non-negative decimal.
        let id = node_id("a_very_long_model_name_that_wraps_the_hash_around");
        assert!(id.parse::<u32>().is_ok());
    }

    #[test]
    fn test_contains_fold() {
        let cols = vec!["Order_Id".to_string(), "amount".to_string()];
        assert!(contains_fold(&cols, "ORDER_ID"));
        assert!(contains_fold(&cols, "Amount"));
        assert!(!contains_fold(&cols, "missing"));
    }
}

//! Parameter counting for JVM method descriptors
//!
//! A descriptor such as `(I[Ljava/lang/String;Z)V` encodes parameter types
//! between the parentheses. This is a best-effort scanner over that grammar,
//! not a validator: unrecognized characters contribute nothing.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// The descriptor has no parenthesized parameter list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid method descriptor {descriptor:?}: no parameter list found")]
pub struct DescriptorError {
    pub descriptor: String,
}

fn parameter_list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Non-greedy: first '(' up to the next ')'
    RE.get_or_init(|| Regex::new(r"\(.*?\)").expect("parameter list pattern is valid"))
}

fn parameter_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Array markers prefix a token but are not tokens themselves.
    // Reference types run through the next ';', slashes included.
    RE.get_or_init(|| {
        Regex::new(r"\[*(?:[CZSIJFD]|L[^;]+;)").expect("parameter token pattern is valid")
    })
}

/// Count the formal parameters encoded in a method descriptor
pub fn count_parameters(descriptor: &str) -> Result<usize, DescriptorError> {
    let segment = parameter_list_re()
        .find(descriptor)
        .ok_or_else(|| DescriptorError {
            descriptor: descriptor.to_string(),
        })?;

    Ok(parameter_token_re().find_iter(segment.as_str()).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_parameters() {
        assert_eq!(count_parameters("()V").unwrap(), 0);
    }

    #[test]
    fn test_primitives() {
        assert_eq!(count_parameters("(IJ)V").unwrap(), 2);
        assert_eq!(count_parameters("(CZSIJFD)V").unwrap(), 7);
    }

    #[test]
    fn test_mixed_with_array_reference() {
        assert_eq!(count_parameters("(I[Ljava/lang/String;Z)V").unwrap(), 3);
    }

    #[test]
    fn test_reference_type_consumes_package_path() {
        // The 'I' and 'D' letters inside the class name must not be counted
        assert_eq!(
            count_parameters("(Lcom/Inner/DataIO;)Ljava/lang/Object;").unwrap(),
            1
        );
    }

    #[test]
    fn test_multi_dimensional_arrays_count_once() {
        assert_eq!(count_parameters("([[I[[[Ljava/util/List;)V").unwrap(), 2);
    }

    #[test]
    fn test_return_type_is_ignored() {
        assert_eq!(count_parameters("(I)[Ljava/lang/String;").unwrap(), 1);
    }

    #[test]
    fn test_missing_parameter_list_is_error() {
        let err = count_parameters("V").unwrap_err();
        assert_eq!(err.descriptor, "V");
        assert!(count_parameters("").is_err());
        assert!(count_parameters("(I").is_err());
    }

    #[test]
    fn test_unrecognized_codes_contribute_nothing() {
        // 'B' is outside the recognized primitive set
        assert_eq!(count_parameters("(BI)V").unwrap(), 1);
    }

    fn param_token() -> impl Strategy<Value = String> {
        let primitive = prop::sample::select(vec!["C", "Z", "S", "I", "J", "F", "D"])
            .prop_map(str::to_string);
        let reference = "[a-z]{1,6}(/[A-Za-z]{1,8}){0,3}".prop_map(|p| format!("L{};", p));
        (0usize..4, prop_oneof![primitive, reference])
            .prop_map(|(dims, token)| format!("{}{}", "[".repeat(dims), token))
    }

    proptest! {
        #[test]
        fn prop_counts_every_token(tokens in prop::collection::vec(param_token(), 0..8)) {
            let descriptor = format!("({})V", tokens.concat());
            prop_assert_eq!(count_parameters(&descriptor).unwrap(), tokens.len());
        }
    }
}

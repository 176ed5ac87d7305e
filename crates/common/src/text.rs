//! Line ending normalization
//!
//! Content read through the bridge is compared against literals written on
//! any platform, so every `\r\n`, lone `\r` and `\n` becomes a single `\n`.

/// Rewrite every line terminator in `input` to `\n`.
pub fn normalize_eol(input: &str) -> String {
    if !input.contains('\r') {
        return input.to_string();
    }
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split normalized content into lines, keeping a trailing empty line the
/// same way `str::split('\n')` does.
pub fn lines(input: &str) -> Vec<&str> {
    input.split('\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a\r\nb", "a\nb" ; "crlf")]
    #[test_case("a\rb", "a\nb" ; "lone cr")]
    #[test_case("a\nb", "a\nb" ; "lf")]
    #[test_case("a\r\n\r\nb\rc\n", "a\n\nb\nc\n" ; "mixed")]
    #[test_case("\r\r\n", "\n\n" ; "cr before crlf")]
    #[test_case("", "" ; "empty")]
    fn test_normalize(input: &str, expected: &str) {
        assert_eq!(normalize_eol(input), expected);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_eol("one\r\ntwo\rthree\nfour\r\n");
        assert_eq!(normalize_eol(&once), once);
        assert!(!once.contains('\r'));
    }

    #[test]
    fn test_lines_keeps_trailing_empty() {
        assert_eq!(lines("a\nb\n"), vec!["a", "b", ""]);
    }
}

//! The canonical glob grammar.
//!
//! One conversion serves every pattern surface in the service: user
//! blocked patterns, copy/sync exclusions, watch filters, and search
//! file-type filters. `*` becomes `.*` (crossing separators), `?` becomes
//! `.`, everything else is matched literally. Compiled patterns are
//! searched unanchored against the full path string.

use regex::Regex;

/// Convert a glob pattern into its regex source.
#[must_use]
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len().saturating_mul(2));
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            // Escape regex metacharacters so they match literally.
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(ch);
            },
            _ => out.push(ch),
        }
    }
    out
}

/// Compile a glob pattern, optionally case-insensitive.
///
/// # Errors
///
/// Returns a [`regex::Error`] if the converted pattern exceeds the regex
/// engine's limits (the conversion itself cannot produce invalid syntax).
pub fn compile_glob(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let source = glob_to_regex(pattern);
    if case_insensitive {
        Regex::new(&format!("(?i){source}"))
    } else {
        Regex::new(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_crosses_separators() {
        let re = compile_glob("*.tmp", false).unwrap();
        assert!(re.is_match("/ws/a/b/c.tmp"));
        assert!(re.is_match("/ws/x.tmp"));
        assert!(!re.is_match("/ws/x.txt"));
    }

    #[test]
    fn test_question_mark_single_char() {
        let re = compile_glob("cache-?", false).unwrap();
        assert!(re.is_match("/ws/cache-1"));
        assert!(re.is_match("/ws/cache-a/file"));
    }

    #[test]
    fn test_literal_dots_escaped() {
        let re = compile_glob(".env", false).unwrap();
        assert!(re.is_match("/ws/.env"));
        assert!(!re.is_match("/ws/xenv"));
    }

    #[test]
    fn test_case_insensitive_flag() {
        let re = compile_glob("password", true).unwrap();
        assert!(re.is_match("/ws/MyPASSWORD.txt"));
    }

    #[test]
    fn test_unanchored_search() {
        let re = compile_glob("node_modules", false).unwrap();
        assert!(re.is_match("/ws/a/node_modules/b"));
    }
}

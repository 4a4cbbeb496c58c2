// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Glob-to-regex translation for `patternSearch`. Both glob and explicit
//! regex patterns are anchored unless the caller supplies explicit `.*`.

use memento_types::{MementoError, Result};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Regex,
    Glob,
}

pub fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '[' | ']' | '{' | '}' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            other => out.push(other),
        }
    }
    out
}

pub fn compile_pattern(pattern: &str, kind: PatternKind) -> Result<Regex> {
    let body = match kind {
        PatternKind::Regex => pattern.to_string(),
        PatternKind::Glob => glob_to_regex(pattern),
    };
    // Anchor unless the caller already opted into unanchored matching via `.*`.
    let anchored = if body.starts_with(".*") || body.ends_with(".*") {
        body
    } else {
        format!("^{body}$")
    };
    Regex::new(&anchored).map_err(|e| MementoError::InputValidation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_becomes_dot_star() {
        assert_eq!(glob_to_regex("src/*.ts"), "src/.*\\.ts");
    }

    #[test]
    fn compiled_glob_matches_full_string_by_default() {
        let re = compile_pattern("src/*.ts", PatternKind::Glob).unwrap();
        assert!(re.is_match("src/main.ts"));
        assert!(!re.is_match("other/src/main.ts"));
    }

    #[test]
    fn explicit_dot_star_disables_anchoring() {
        let re = compile_pattern(".*main.*", PatternKind::Regex).unwrap();
        assert!(re.is_match("other/src/main.ts"));
    }
}

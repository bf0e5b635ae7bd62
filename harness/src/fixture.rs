//! Classifying the lines of a fixture file.
//!
//! A fixture is ordinary source code interleaved with assertion lines:
//!
//! ```text
//! # SYNTAX TEST "source.collie"
//! if (x) return;
//! # ^^ keyword.control.collie
//! ```
//!
//! Each assertion refers to the closest code line above it, and its carets mark the columns
//! being checked.

use std::path::{Path, PathBuf};

use crate::session::TokenizationError;

/// The markers which distinguish the different kinds of line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSyntax {
    header_directive: String,
    assertion_marker: String,
}

impl Default for FixtureSyntax {
    fn default() -> Self {
        Self::new("# SYNTAX TEST", "#")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLine {
    /// 1-based
    pub number: usize,
    pub kind: LineKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Directive,
    Code(String),
    Assertion(Assertion),
    /// Starts with the assertion marker, but has no carets or no expected scope
    Malformed(String),
}

/// A claim that the innermost scope at some columns of the preceding code line is
/// `expected_scope`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub line_number: usize,
    /// Column (in characters) of the first caret
    pub start_column: usize,
    /// One past the column of the last caret
    pub end_column: usize,
    pub expected_scope: String,
    /// The assertion line as written, minus trailing whitespace
    pub text: String,
}

impl FixtureSyntax {
    pub fn new(header_directive: &str, assertion_marker: &str) -> Self {
        Self {
            header_directive: header_directive.to_owned(),
            assertion_marker: assertion_marker.to_owned(),
        }
    }

    /// Lazily classify every line of a fixture file, in order
    pub fn lines<'a>(&'a self, source: &'a str) -> impl Iterator<Item = FixtureLine> + 'a {
        source
            .lines()
            .enumerate()
            .map(move |(idx, raw)| self.classify(idx + 1, raw))
    }

    pub fn classify(&self, number: usize, raw: &str) -> FixtureLine {
        let line = raw.trim_end();
        let trimmed = line.trim_start();
        let is_directive =
            !self.header_directive.is_empty() && trimmed.starts_with(&self.header_directive);
        let kind = if is_directive {
            LineKind::Directive
        } else if trimmed.starts_with(&self.assertion_marker) {
            match self.parse_assertion(number, line) {
                Some(assertion) => LineKind::Assertion(assertion),
                None => LineKind::Malformed(line.to_owned()),
            }
        } else {
            LineKind::Code(line.to_owned())
        };
        FixtureLine { number, kind }
    }

    /// Parse `<indent><marker><blanks><carets><blanks><scope>`, where `line` has already had its
    /// trailing whitespace removed
    fn parse_assertion(&self, line_number: usize, line: &str) -> Option<Assertion> {
        let after_marker = line.trim_start().strip_prefix(&self.assertion_marker)?;
        let carets = after_marker.trim_start();
        let caret_count = carets.chars().take_while(|&c| c == '^').count();
        if caret_count == 0 {
            return None;
        }
        // `^` is one byte, so the count doubles as a byte offset
        let expected_scope = carets[caret_count..].trim();
        if expected_scope.is_empty() {
            return None;
        }

        let start_column = line.chars().count() - carets.chars().count();
        Some(Assertion {
            line_number,
            start_column,
            end_column: start_column + caret_count,
            expected_scope: expected_scope.to_owned(),
            text: line.to_owned(),
        })
    }
}

/// Read a fixture file into memory
pub fn read_fixture(path: &Path) -> Result<String, FixtureError> {
    std::fs::read_to_string(path).map_err(|e| FixtureError::Unreadable(path.to_owned(), e))
}

/// Problems which stop (part of) a fixture file from being checked
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("can't read fixture {}: {1}", .0.display())]
    Unreadable(PathBuf, #[source] std::io::Error),
    #[error(transparent)]
    Tokenization(#[from] TokenizationError),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Assertion, FixtureSyntax, LineKind};

    fn kind(line: &str) -> LineKind {
        FixtureSyntax::default().classify(1, line).kind
    }

    fn assertion(line: &str) -> Assertion {
        match kind(line) {
            LineKind::Assertion(a) => a,
            other => panic!("{:?} is not an assertion: {:?}", line, other),
        }
    }

    #[test]
    fn directive_lines() {
        assert_eq!(kind("# SYNTAX TEST \"source.collie\""), LineKind::Directive);
        assert_eq!(kind("  # SYNTAX TEST"), LineKind::Directive);
        assert!(matches!(kind("# SYNTAX"), LineKind::Malformed(_)));
    }

    #[test]
    fn code_lines_lose_trailing_whitespace() {
        assert_eq!(kind("let x = 1;   \r"), LineKind::Code("let x = 1;".to_owned()));
        assert_eq!(kind(""), LineKind::Code(String::new()));
        assert_eq!(kind("x # not an assertion"), LineKind::Code("x # not an assertion".to_owned()));
    }

    #[test]
    fn caret_columns() {
        let a = assertion("#   ^^^ keyword.control.collie");
        assert_eq!((a.start_column, a.end_column), (4, 7));
        assert_eq!(a.expected_scope, "keyword.control.collie");
        assert_eq!(a.text, "#   ^^^ keyword.control.collie");

        let a = assertion("#^ a");
        assert_eq!((a.start_column, a.end_column), (1, 2));

        // Indented marker
        let a = assertion("    # ^ b");
        assert_eq!((a.start_column, a.end_column), (6, 7));
    }

    #[test]
    fn scope_is_everything_after_the_carets() {
        assert_eq!(assertion("# ^^source.x  ").expected_scope, "source.x");
        assert_eq!(assertion("# ^ two words").expected_scope, "two words");
    }

    #[test]
    fn malformed_assertions() {
        assert_eq!(kind("# just a comment"), LineKind::Malformed("# just a comment".to_owned()));
        assert!(matches!(kind("# ^^^"), LineKind::Malformed(_)));
        assert!(matches!(kind("#"), LineKind::Malformed(_)));
    }

    #[test]
    fn custom_markers() {
        let syntax = FixtureSyntax::new("// SYNTAX TEST", "//");
        assert_eq!(syntax.classify(1, "// SYNTAX TEST").kind, LineKind::Directive);
        match syntax.classify(2, "//  ^ comment.line").kind {
            LineKind::Assertion(a) => assert_eq!(a.start_column, 4),
            other => panic!("expected an assertion, got {:?}", other),
        }
        assert_eq!(syntax.classify(3, "# x").kind, LineKind::Code("# x".to_owned()));
    }

    #[test]
    fn lines_are_numbered_from_one() {
        let syntax = FixtureSyntax::default();
        let numbers: Vec<_> = syntax
            .lines("# SYNTAX TEST\na\n# ^ b\n")
            .map(|l| l.number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}

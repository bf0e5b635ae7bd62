use crate::{fixture::Assertion, session::TokenizedLine};

/// The result of checking one assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass { line_number: usize },
    Fail(Failure),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass { .. })
    }
}

/// A failed assertion, along with everything needed to explain it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The line number of the assertion (not of the code line)
    pub line_number: usize,
    pub assertion_text: String,
    pub kind: FailureKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    ScopeMismatch {
        code_line: String,
        expected: String,
        /// Innermost scope of the token, or empty if the token has no scopes
        actual: String,
        token_text: String,
        position: (usize, usize),
        token_range: (usize, usize),
    },
    NoToken {
        code_line: String,
        position: (usize, usize),
    },
    /// The assertion comes before any code line in its file
    NoCodeLine,
    /// The code line being asserted on couldn't be tokenized
    Untokenized {
        code_line: String,
        code_line_number: usize,
    },
    /// Only produced when malformed assertions are strict
    Malformed,
}

/// Check `assertion` against the tokens of the code line above it.  Only the first caret column
/// is used to find the token; the other carets only document the extent being checked.
pub fn evaluate(assertion: &Assertion, code: &TokenizedLine) -> Outcome {
    let position = (assertion.start_column, assertion.end_column);
    let kind = match code.token_at(assertion.start_column) {
        None => FailureKind::NoToken {
            code_line: code.text.clone(),
            position,
        },
        Some(token) => {
            let actual = token.innermost_scope().unwrap_or_default();
            if actual == assertion.expected_scope {
                return Outcome::Pass {
                    line_number: assertion.line_number,
                };
            }
            FailureKind::ScopeMismatch {
                code_line: code.text.clone(),
                expected: assertion.expected_scope.clone(),
                actual: actual.to_owned(),
                token_text: code.text_of(token),
                position,
                token_range: (token.start, token.end),
            }
        }
    };
    Outcome::Fail(Failure::new(assertion, kind))
}

impl Failure {
    pub fn new(assertion: &Assertion, kind: FailureKind) -> Self {
        Self {
            line_number: assertion.line_number,
            assertion_text: assertion.text.clone(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{evaluate, FailureKind, Outcome};
    use crate::{
        fixture::Assertion,
        session::{ColumnToken, TokenizedLine},
    };

    fn line() -> TokenizedLine {
        let tok = |start, end, inner: &str| ColumnToken {
            start,
            end,
            scopes: vec!["source.collie".to_owned(), inner.to_owned()],
        };
        TokenizedLine {
            line_number: 4,
            text: "if (x) return;".to_owned(),
            tokens: vec![
                tok(0, 2, "keyword.control.collie"),
                tok(2, 6, "meta.paren.collie"),
                tok(7, 13, "keyword.control.collie"),
                tok(13, 14, "punctuation.terminator.collie"),
            ],
        }
    }

    fn assertion(start: usize, carets: usize, scope: &str) -> Assertion {
        Assertion {
            line_number: 5,
            start_column: start,
            end_column: start + carets,
            expected_scope: scope.to_owned(),
            text: format!("# {}", scope),
        }
    }

    #[test]
    fn matching_scope_passes() {
        let outcome = evaluate(&assertion(7, 6, "keyword.control.collie"), &line());
        assert_eq!(outcome, Outcome::Pass { line_number: 5 });
        // Any column inside the token works
        assert!(evaluate(&assertion(1, 1, "keyword.control.collie"), &line()).is_pass());
    }

    #[test]
    fn only_the_innermost_scope_counts() {
        let outcome = evaluate(&assertion(0, 2, "source.collie"), &line());
        assert!(!outcome.is_pass());
    }

    #[test]
    fn mismatch_records_the_token() {
        let failure = match evaluate(&assertion(3, 1, "variable.other.collie"), &line()) {
            Outcome::Fail(f) => f,
            other => panic!("expected a failure, got {:?}", other),
        };
        assert_eq!(failure.line_number, 5);
        assert_eq!(
            failure.kind,
            FailureKind::ScopeMismatch {
                code_line: "if (x) return;".to_owned(),
                expected: "variable.other.collie".to_owned(),
                actual: "meta.paren.collie".to_owned(),
                token_text: " (x)".to_owned(),
                position: (3, 4),
                token_range: (2, 6),
            }
        );
    }

    #[test]
    fn uncovered_columns_have_no_token() {
        // Column 6 falls in the gap between tokens, column 20 is past the end of the line
        for start in [6, 20] {
            match evaluate(&assertion(start, 1, "x"), &line()) {
                Outcome::Fail(f) => assert!(matches!(f.kind, FailureKind::NoToken { .. })),
                other => panic!("expected a failure, got {:?}", other),
            }
        }
    }
}

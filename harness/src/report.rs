use std::{
    fmt::{self, Write},
    path::PathBuf,
};

use crate::{
    evaluate::{Failure, FailureKind, Outcome},
    fixture::FixtureError,
};

/// Everything that happened while checking one fixture file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    /// How the file is named in the rendered report
    pub name: String,
    /// One per assertion, in file order
    pub outcomes: Vec<Outcome>,
    /// Problems which stopped some or all of the file from being checked
    pub errors: Vec<FixtureError>,
}

impl FileReport {
    pub fn new(path: PathBuf, name: String) -> Self {
        Self {
            path,
            name,
            outcomes: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.outcomes.iter().filter_map(|o| match o {
            Outcome::Fail(f) => Some(f),
            Outcome::Pass { .. } => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.errors.is_empty()
    }
}

/// The result of a whole run, built by folding [`FileReport`]s together
#[derive(Debug, Default)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
    /// Problems with the run as a whole (e.g. an unreadable fixture directory)
    pub run_errors: Vec<String>,
}

impl RunSummary {
    pub fn with_file(mut self, file: FileReport) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_run_error(mut self, message: String) -> Self {
        self.run_errors.push(message);
        self
    }

    pub fn passed(&self) -> usize {
        self.files.iter().map(FileReport::passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().map(FileReport::failed).sum()
    }

    pub fn total(&self) -> usize {
        self.passed() + self.failed()
    }

    /// Number of files with at least one file-level error
    pub fn error_files(&self) -> usize {
        self.files.iter().filter(|f| !f.errors.is_empty()).count()
    }

    pub fn is_success(&self) -> bool {
        self.run_errors.is_empty() && self.files.iter().all(FileReport::is_clean)
    }

    /// `0` on success, `1` otherwise.  Fatal errors (which never produce a summary) are reported
    /// separately by the caller.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl FromIterator<FileReport> for RunSummary {
    fn from_iter<I: IntoIterator<Item = FileReport>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::with_file)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f)
    }
}

/// Write the full human-readable report: per-file failure blocks followed by the summary
pub fn render(summary: &RunSummary, out: &mut impl Write) -> fmt::Result {
    for file in &summary.files {
        if !file.is_clean() {
            render_file(file, out)?;
        }
    }
    for message in &summary.run_errors {
        writeln!(out, "\nError: {}", message)?;
    }

    writeln!(out, "\nTest Summary:")?;
    let (passed, failed) = (summary.passed(), summary.failed());
    if failed > 0 {
        writeln!(out, "  ✗ {} tests failed", failed)?;
    }
    // Errors can fail a run with no failed assertions
    if summary.is_success() {
        writeln!(out, "  ✓ All {} tests passed", passed)?;
    } else {
        writeln!(out, "  ✓ {} tests passed", passed)?;
    }
    writeln!(out, "  Total: {} tests", passed + failed)?;
    let error_files = summary.error_files();
    if error_files > 0 {
        writeln!(out, "  ✗ {} fixture files could not be checked", error_files)?;
    }
    Ok(())
}

fn render_file(file: &FileReport, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "\nFailures in {}:", file.name)?;
    for failure in file.failures() {
        render_failure(failure, out)?;
    }
    for error in &file.errors {
        writeln!(out, "\nError: {}", error)?;
    }
    Ok(())
}

fn render_failure(failure: &Failure, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "\nFailed assertion at line {}:", failure.line_number)?;
    let assertion = &failure.assertion_text;
    match &failure.kind {
        FailureKind::ScopeMismatch {
            code_line,
            expected,
            actual,
            token_text,
            position,
            token_range,
        } => {
            writeln!(out, "Code line: \"{}\"", code_line)?;
            writeln!(out, "Assertion: \"{}\"", assertion)?;
            writeln!(out, "Expected scope: {}", expected)?;
            writeln!(out, "Actual scope: {}", actual)?;
            writeln!(out, "Text: \"{}\"", token_text)?;
            writeln!(
                out,
                "Position: {}-{} (token: {}-{})",
                position.0, position.1, token_range.0, token_range.1
            )
        }
        FailureKind::NoToken {
            code_line,
            position,
        } => {
            writeln!(out, "No token found at position {}-{}", position.0, position.1)?;
            writeln!(out, "Code line: \"{}\"", code_line)?;
            writeln!(out, "Assertion: \"{}\"", assertion)
        }
        FailureKind::NoCodeLine => {
            writeln!(out, "No code line precedes this assertion")?;
            writeln!(out, "Assertion: \"{}\"", assertion)
        }
        FailureKind::Untokenized {
            code_line,
            code_line_number,
        } => {
            writeln!(out, "Line {} could not be tokenized", code_line_number)?;
            writeln!(out, "Code line: \"{}\"", code_line)?;
            writeln!(out, "Assertion: \"{}\"", assertion)
        }
        FailureKind::Malformed => {
            writeln!(out, "Malformed assertion")?;
            writeln!(out, "Assertion: \"{}\"", assertion)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::{FileReport, RunSummary};
    use crate::{
        evaluate::{Failure, FailureKind, Outcome},
        fixture::FixtureError,
        session::TokenizationError,
    };

    fn pass(line_number: usize) -> Outcome {
        Outcome::Pass { line_number }
    }

    fn mismatch() -> Outcome {
        Outcome::Fail(Failure {
            line_number: 3,
            assertion_text: "#  ^ keyword.control.collie".to_owned(),
            kind: FailureKind::ScopeMismatch {
                code_line: "x if".to_owned(),
                expected: "keyword.control.collie".to_owned(),
                actual: "source.collie".to_owned(),
                token_text: "x if".to_owned(),
                position: (3, 4),
                token_range: (0, 4),
            },
        })
    }

    fn file(name: &str, outcomes: Vec<Outcome>) -> FileReport {
        let mut report = FileReport::new(PathBuf::from(name), name.to_owned());
        report.outcomes = outcomes;
        report
    }

    #[test]
    fn all_passing() {
        let summary: RunSummary = vec![file("a.test.collie", vec![pass(2), pass(3)])]
            .into_iter()
            .collect();
        assert!(summary.is_success());
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(
            summary.to_string(),
            "\nTest Summary:\n  ✓ All 2 tests passed\n  Total: 2 tests\n"
        );
    }

    #[test]
    fn no_files_is_a_successful_empty_run() {
        let summary = RunSummary::default();
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.exit_code(), 0);
        assert!(summary.to_string().contains("  ✓ All 0 tests passed\n  Total: 0 tests\n"));
    }

    #[test]
    fn two_files_with_one_failure() {
        let summary: RunSummary = vec![
            file("a.test.collie", vec![pass(2), pass(3), pass(5)]),
            file("b.test.collie", vec![pass(2), mismatch()]),
        ]
        .into_iter()
        .collect();
        assert_eq!((summary.passed(), summary.failed(), summary.total()), (4, 1, 5));
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.to_string(),
            "\nFailures in b.test.collie:\n\
             \nFailed assertion at line 3:\n\
             Code line: \"x if\"\n\
             Assertion: \"#  ^ keyword.control.collie\"\n\
             Expected scope: keyword.control.collie\n\
             Actual scope: source.collie\n\
             Text: \"x if\"\n\
             Position: 3-4 (token: 0-4)\n\
             \nTest Summary:\n  ✗ 1 tests failed\n  ✓ 4 tests passed\n  Total: 5 tests\n"
        );
    }

    #[test]
    fn rendering_is_idempotent() {
        let summary: RunSummary = vec![file("b.test.collie", vec![mismatch(), pass(4)])]
            .into_iter()
            .collect();
        assert_eq!(summary.to_string(), summary.to_string());
    }

    #[test]
    fn other_failure_kinds() {
        let fail = |line_number, kind| {
            Outcome::Fail(Failure {
                line_number,
                assertion_text: "# ^ x".to_owned(),
                kind,
            })
        };
        let summary: RunSummary = vec![file(
            "c.test.collie",
            vec![
                fail(1, FailureKind::NoCodeLine),
                fail(
                    3,
                    FailureKind::NoToken {
                        code_line: "".to_owned(),
                        position: (2, 3),
                    },
                ),
            ],
        )]
        .into_iter()
        .collect();
        let text = summary.to_string();
        assert!(text.contains("\nFailed assertion at line 1:\nNo code line precedes this assertion\n"));
        assert!(text.contains(
            "\nFailed assertion at line 3:\nNo token found at position 2-3\nCode line: \"\"\n"
        ));
        assert!(text.contains("  ✗ 2 tests failed\n  ✓ 0 tests passed\n"));
    }

    #[test]
    fn file_errors_fail_the_run() {
        let mut broken = file("d.test.collie", vec![pass(2)]);
        broken.errors.push(FixtureError::Tokenization(TokenizationError {
            line_number: 4,
            message: "boom".to_owned(),
        }));
        let summary: RunSummary = vec![broken].into_iter().collect();

        assert_eq!(summary.failed(), 0);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.to_string(),
            "\nFailures in d.test.collie:\n\
             \nError: line 4 could not be tokenized: boom\n\
             \nTest Summary:\n  ✓ 1 tests passed\n  Total: 1 tests\n  \
             ✗ 1 fixture files could not be checked\n"
        );
    }

    #[test]
    fn run_errors_fail_the_run() {
        let summary = RunSummary::default().with_run_error("can't read tests/syntax".to_owned());
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.to_string(),
            "\nError: can't read tests/syntax\n\
             \nTest Summary:\n  ✓ 0 tests passed\n  Total: 0 tests\n"
        );
    }
}

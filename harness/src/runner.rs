use std::path::{Path, PathBuf};

use crate::{
    config::Config,
    discovery::{self, Discovered},
    engine::Engine,
    evaluate::{self, Failure, FailureKind, Outcome},
    fixture::{self, Assertion, FixtureLine, FixtureSyntax, LineKind},
    loader::LoadError,
    report::{FileReport, RunSummary},
    session::{Session, TokenizedLine},
};

/// Checks fixture files against one grammar.  The grammar is loaded once, when the harness is
/// created, and shared by every file.
pub struct Harness<E: Engine> {
    engine: E,
    grammar: E::Grammar,
    config: Config,
    syntax: FixtureSyntax,
}

impl<E: Engine> Harness<E> {
    /// Load the grammar for `config.scope_name`.  Failing to do so is fatal to the whole run.
    pub fn new(mut engine: E, config: Config) -> Result<Self, LoadError> {
        let grammar = engine.load_grammar(&config.scope_name)?;
        Ok(Self {
            engine,
            grammar,
            syntax: config.fixture_syntax(),
            config,
        })
    }

    /// Check every fixture under the configured fixture directory
    pub fn run(&self) -> RunSummary {
        let dir = &self.config.fixture_dir;
        match discovery::discover_fixtures(dir, &self.config.fixture_suffix) {
            Ok(found) => {
                log::debug!("Found {} fixtures in {}", found.fixtures.len(), dir.display());
                self.check_discovered(found)
            }
            Err(e) => {
                log::error!("Can't read fixture directory {}: {}", dir.display(), e);
                RunSummary::default().with_run_error(format!(
                    "can't read fixture directory {}: {}",
                    dir.display(),
                    e
                ))
            }
        }
    }

    /// Check every discovered fixture.  Parts of the tree which couldn't be searched fail the run,
    /// since the fixtures inside them were never checked.
    fn check_discovered(&self, found: Discovered) -> RunSummary {
        let summary = self.check_files(&found.fixtures);
        found.errors.into_iter().fold(summary, |summary, e| {
            log::error!("{}", e);
            summary.with_run_error(e.to_string())
        })
    }

    pub fn check_files(&self, paths: &[PathBuf]) -> RunSummary {
        paths.iter().map(|path| self.check_file(path)).collect()
    }

    pub fn check_file(&self, path: &Path) -> FileReport {
        let name = self.display_name(path);
        log::debug!("Checking {}", name);
        match fixture::read_fixture(path) {
            Ok(source) => self.check_source(path.to_owned(), name, &source),
            Err(e) => {
                log::warn!("{}", e);
                let mut report = FileReport::new(path.to_owned(), name);
                report.errors.push(e);
                report
            }
        }
    }

    /// Check the contents of one fixture file.  This is a left fold over the file's classified
    /// lines, starting from a fresh tokenizer session.
    pub fn check_source(&self, path: PathBuf, name: String, source: &str) -> FileReport {
        let start = FileRun {
            session: Session::new(&self.engine, &self.grammar),
            strict: self.config.strict_assertions,
            last_code: None,
            halted: false,
            report: FileReport::new(path, name),
        };
        self.syntax
            .lines(source)
            .fold(start, FileRun::step)
            .report
    }

    /// Fixtures are named relative to the fixture directory, falling back on the full path
    fn display_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.fixture_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// The accumulator for checking one file
struct FileRun<'h, E: Engine> {
    session: Session<'h, E>,
    strict: bool,
    last_code: Option<LastCode>,
    /// Set once tokenizing has failed and another code line is reached
    halted: bool,
    report: FileReport,
}

/// The code line which assertions currently refer to
enum LastCode {
    Tokenized(TokenizedLine),
    Failed { line_number: usize, text: String },
}

impl<'h, E: Engine> FileRun<'h, E> {
    fn step(mut self, line: FixtureLine) -> Self {
        if self.halted {
            return self;
        }
        match line.kind {
            LineKind::Directive => {}
            LineKind::Code(text) => self.code_line(line.number, text),
            LineKind::Assertion(assertion) => {
                let outcome = self.check(&assertion);
                log::trace!("line {}: {:?}", line.number, outcome);
                self.report.outcomes.push(outcome);
            }
            LineKind::Malformed(text) => {
                if self.strict {
                    self.report.outcomes.push(Outcome::Fail(Failure {
                        line_number: line.number,
                        assertion_text: text,
                        kind: FailureKind::Malformed,
                    }));
                } else {
                    log::debug!("Skipping malformed assertion on line {}", line.number);
                }
            }
        }
        self
    }

    fn code_line(&mut self, line_number: usize, text: String) {
        if let Some(LastCode::Failed { .. }) = self.last_code {
            log::debug!("Skipping the rest of {} after a tokenizing error", self.report.name);
            self.halted = true;
            return;
        }
        self.last_code = Some(match self.session.tokenize(line_number, &text) {
            Ok(tokenized) => LastCode::Tokenized(tokenized),
            Err(e) => {
                log::warn!("{}: {}", self.report.name, e);
                self.report.errors.push(e.into());
                LastCode::Failed { line_number, text }
            }
        });
    }

    fn check(&self, assertion: &Assertion) -> Outcome {
        let kind = match &self.last_code {
            Some(LastCode::Tokenized(code)) => return evaluate::evaluate(assertion, code),
            Some(LastCode::Failed { line_number, text }) => FailureKind::Untokenized {
                code_line: text.clone(),
                code_line_number: *line_number,
            },
            None => FailureKind::NoCodeLine,
        };
        Outcome::Fail(Failure::new(assertion, kind))
    }
}

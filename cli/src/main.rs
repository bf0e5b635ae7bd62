//! Command-line front end: checks every fixture against the grammar, prints the report to stdout
//! and signals the outcome through the exit code.

use std::path::PathBuf;

use scopecheck::{Config, ConfigError, Harness, TextMateEngine};

/// Exit code for errors which stop the run before any fixture is checked
const EXIT_FATAL: i32 = 2;

const USAGE: &str = "\
Usage: scopecheck [options]

Options:
  --config <file>     Load settings from a TOML file
  --grammar <path>    Grammar file, or directory of grammar files
  --fixtures <dir>    Directory to search for fixture files
  --scope <name>      Root scope of the grammar under test
  --strict            Count malformed assertion lines as failures
  -h, --help          Show this message

Log output is controlled by RUST_LOG (default: warn).";

fn main() {
    init_logging();

    let args = match Command::parse(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return;
        }
        Ok(Command::Check(args)) => args,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            std::process::exit(EXIT_FATAL);
        }
    };
    std::process::exit(check(args));
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Warn);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

/// Run the harness, returning the process's exit code
fn check(args: Args) -> i32 {
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return EXIT_FATAL;
        }
    };
    log::info!(
        "Checking {} against {}",
        config.fixture_dir.display(),
        config.grammar_path.display()
    );

    let engine = TextMateEngine::new(&config.grammar_path);
    let harness = match Harness::new(engine, config) {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Grammar error: {}", e);
            return EXIT_FATAL;
        }
    };
    let summary = harness.run();
    print!("{}", summary);
    summary.exit_code()
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    Check(Args),
}

/// Command-line options.  Anything given here overrides the config file.
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    grammar: Option<PathBuf>,
    fixtures: Option<PathBuf>,
    scope: Option<String>,
    strict: bool,
}

impl Command {
    /// Parse the arguments after the program name.  Options taking a value accept both
    /// `--opt value` and `--opt=value`.
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline_value) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_owned(), Some(value.to_owned()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = || {
                inline_value
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| format!("`{}` needs a value", flag))
            };
            match flag.as_str() {
                "-h" | "--help" => return Ok(Command::Help),
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--grammar" => parsed.grammar = Some(PathBuf::from(value()?)),
                "--fixtures" => parsed.fixtures = Some(PathBuf::from(value()?)),
                "--scope" => parsed.scope = Some(value()?),
                "--strict" => parsed.strict = true,
                _ => return Err(format!("unknown argument `{}`", flag)),
            }
        }
        Ok(Command::Check(parsed))
    }
}

impl Args {
    fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load_toml_file(path)?,
            None => Config::default(),
        };
        if let Some(grammar) = self.grammar {
            config.grammar_path = grammar;
        }
        if let Some(fixtures) = self.fixtures {
            config.fixture_dir = fixtures;
        }
        if let Some(scope) = self.scope {
            config.scope_name = scope;
        }
        config.strict_assertions |= self.strict;
        config.validate()?;
        Ok(config)
    }
}

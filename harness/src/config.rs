use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::fixture::FixtureSyntax;

/// Everything a run of the harness needs to know, loaded from an (optional) TOML file and then
/// overridden by the command line.  Every key is optional; missing keys take the values of
/// [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// Either one `*.tmLanguage.json` file, or a directory containing several
    pub grammar_path: PathBuf,
    /// Root of the (recursively searched) fixture tree
    pub fixture_dir: PathBuf,
    /// Root scope of the grammar under test
    pub scope_name: String,
    pub fixture_suffix: String,
    /// Lines starting with this are skipped entirely
    pub header_directive: String,
    /// Lines whose first non-blank text is this are assertion lines
    pub assertion_marker: String,
    /// Count malformed assertion lines as failures instead of skipping them
    pub strict_assertions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grammar_path: PathBuf::from("syntaxes/collie.tmLanguage.json"),
            fixture_dir: PathBuf::from("tests/syntax"),
            scope_name: "source.collie".to_owned(),
            fixture_suffix: ".test.collie".to_owned(),
            header_directive: "# SYNTAX TEST".to_owned(),
            assertion_marker: "#".to_owned(),
            strict_assertions: false,
        }
    }
}

impl Config {
    /// Load a config file.  Relative paths inside it are taken relative to the directory
    /// containing the file, not the working directory.
    pub fn load_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_string =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_owned(), e))?;
        let mut config = Self::from_toml(&toml_string)?;
        if let Some(base) = path.parent() {
            config.grammar_path = base.join(&config.grammar_path);
            config.fixture_dir = base.join(&config.fixture_dir);
        }
        Ok(config)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values which would make classifying fixture lines meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("scope_name", &self.scope_name),
            ("fixture_suffix", &self.fixture_suffix),
            ("assertion_marker", &self.assertion_marker),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(key));
            }
        }
        Ok(())
    }

    pub fn fixture_syntax(&self) -> FixtureSyntax {
        FixtureSyntax::new(&self.header_directive, &self.assertion_marker)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read config file {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("config key `{0}` must not be empty")]
    Empty(&'static str),
}

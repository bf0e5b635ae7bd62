use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use scopecheck_grammar::{ConvertError, Grammar, SpecGrammar};

/// Finds and compiles grammars by their root scope name.
///
/// The registry is pointed at either a single `*.tmLanguage.json` file or a directory of them.
/// Each grammar is compiled at most once; later requests for the same scope share the compiled
/// [`Grammar`].
#[derive(Debug, Clone)]
pub struct GrammarRegistry {
    grammar_path: PathBuf,
    loaded: HashMap<String, Arc<Grammar>>,
}

impl GrammarRegistry {
    pub fn new(grammar_path: impl Into<PathBuf>) -> Self {
        Self {
            grammar_path: grammar_path.into(),
            loaded: HashMap::new(),
        }
    }

    pub fn load(&mut self, scope_name: &str) -> Result<Arc<Grammar>, LoadError> {
        if let Some(grammar) = self.loaded.get(scope_name) {
            return Ok(grammar.clone());
        }

        for path in self.candidate_files()? {
            let spec = read_spec_file(&path)?;
            if spec.scope_name() != scope_name {
                log::trace!("Skipping {} (scope {})", path.display(), spec.scope_name());
                continue;
            }
            let grammar = spec
                .into_grammar()
                .map_err(|e| LoadError::Compile(path.clone(), e))?;
            log::debug!(
                "Loaded grammar for {} from {} ({} rules)",
                scope_name,
                path.display(),
                grammar.rules().len()
            );
            let grammar = Arc::new(grammar);
            self.loaded.insert(scope_name.to_owned(), grammar.clone());
            return Ok(grammar);
        }

        Err(LoadError::NotFound {
            scope_name: scope_name.to_owned(),
            searched: self.grammar_path.clone(),
        })
    }

    /// The grammar files to look through, in a deterministic order
    fn candidate_files(&self) -> Result<Vec<PathBuf>, LoadError> {
        let path = &self.grammar_path;
        if path.is_file() {
            return Ok(vec![path.clone()]);
        }
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(path).map_err(|e| LoadError::Io(path.clone(), e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LoadError::Io(path.clone(), e))?;
            let file = entry.path();
            if file.is_file() && is_grammar_file(&file) {
                files.push(file);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_grammar_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.ends_with(".json"))
}

/// Read and deserialize one grammar file, without compiling it
pub fn read_spec_file(path: impl AsRef<Path>) -> Result<SpecGrammar, LoadError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_owned(), e))?;
    serde_json::from_str(&json).map_err(|e| LoadError::Parse(path.to_owned(), e))
}

/// Errors which stop a grammar from being loaded.  All of these are fatal to a harness run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no grammar with scope `{scope_name}` found at {}", .searched.display())]
    NotFound {
        scope_name: String,
        searched: PathBuf,
    },
    #[error("can't read {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("{} is not a valid grammar file: {1}", .0.display())]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("grammar {} can't be compiled: {1}", .0.display())]
    Compile(PathBuf, #[source] ConvertError),
}

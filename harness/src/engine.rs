//! The boundary between the harness and whatever tokenizes lines.
//!
//! The harness only ever needs three things from an engine: loading a grammar by scope name,
//! the state to start each file from, and tokenizing one line given the state left behind by the
//! previous one.  Tokens are reported with byte offsets into the line; conversion to columns
//! happens in [`crate::session`].

use std::{fmt::Debug, path::PathBuf, sync::Arc};

use scopecheck_grammar::{Grammar, RuleStack, TokenizeError};

use crate::loader::{GrammarRegistry, LoadError};

pub use scopecheck_grammar::Token;

pub trait Engine {
    /// A loaded grammar, shared by every file in a run
    type Grammar;
    /// Opaque tokenizer state carried from one line to the next
    type State: Clone + Debug;
    type Error: std::error::Error;

    fn load_grammar(&mut self, scope_name: &str) -> Result<Self::Grammar, LoadError>;

    fn initial_state(&self, grammar: &Self::Grammar) -> Self::State;

    fn tokenize_line(
        &self,
        grammar: &Self::Grammar,
        line: &str,
        prior: &Self::State,
    ) -> Result<(Vec<Token>, Self::State), Self::Error>;
}

/// [`Engine`] backed by the TextMate grammar engine in [`scopecheck_grammar`]
#[derive(Debug, Clone)]
pub struct TextMateEngine {
    registry: GrammarRegistry,
}

impl TextMateEngine {
    pub fn new(grammar_path: impl Into<PathBuf>) -> Self {
        Self {
            registry: GrammarRegistry::new(grammar_path),
        }
    }
}

impl Engine for TextMateEngine {
    type Grammar = Arc<Grammar>;
    type State = RuleStack;
    type Error = TokenizeError;

    fn load_grammar(&mut self, scope_name: &str) -> Result<Arc<Grammar>, LoadError> {
        self.registry.load(scope_name)
    }

    fn initial_state(&self, grammar: &Arc<Grammar>) -> RuleStack {
        RuleStack::initial(grammar)
    }

    fn tokenize_line(
        &self,
        grammar: &Arc<Grammar>,
        line: &str,
        prior: &RuleStack,
    ) -> Result<(Vec<Token>, RuleStack), TokenizeError> {
        let tokenized = grammar.tokenize_line(line, prior)?;
        Ok((tokenized.tokens, tokenized.state))
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, TextMateEngine};

    #[test]
    fn textmate_engine_threads_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tmLanguage.json");
        let json = r#"{
            "scopeName": "source.c",
            "patterns": [{ "begin": "/\\*", "end": "\\*/", "name": "comment.block.c" }]
        }"#;
        std::fs::write(&path, json).unwrap();

        let mut engine = TextMateEngine::new(&path);
        let grammar = engine.load_grammar("source.c").unwrap();
        let start = engine.initial_state(&grammar);
        let (_, inside) = engine.tokenize_line(&grammar, "x /* open", &start).unwrap();
        assert_ne!(inside, start);

        let (tokens, after) = engine.tokenize_line(&grammar, "still */", &inside).unwrap();
        assert_eq!(tokens[0].innermost_scope(), Some("comment.block.c"));
        assert_eq!(after, start);
    }
}

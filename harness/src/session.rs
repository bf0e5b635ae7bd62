use crate::engine::{Engine, Token};

/// A code line together with its tokens.  Token positions are **character** columns, matching
/// the columns of the carets in assertion lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine {
    pub line_number: usize,
    pub text: String,
    pub tokens: Vec<ColumnToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnToken {
    pub start: usize,
    pub end: usize,
    /// Outermost to innermost
    pub scopes: Vec<String>,
}

impl ColumnToken {
    pub fn innermost_scope(&self) -> Option<&str> {
        self.scopes.last().map(String::as_str)
    }
}

impl TokenizedLine {
    /// The token covering `column`, if any
    pub fn token_at(&self, column: usize) -> Option<&ColumnToken> {
        self.tokens
            .iter()
            .find(|tok| tok.start <= column && column < tok.end)
    }

    /// The characters of this line covered by `token`
    pub fn text_of(&self, token: &ColumnToken) -> String {
        self.text
            .chars()
            .skip(token.start)
            .take(token.end - token.start)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line_number} could not be tokenized: {message}")]
pub struct TokenizationError {
    pub line_number: usize,
    pub message: String,
}

/// Tokenizing state for one fixture file.  Each file gets a fresh session, so state never leaks
/// from one file into the next.
pub struct Session<'e, E: Engine> {
    engine: &'e E,
    grammar: &'e E::Grammar,
    state: E::State,
}

impl<'e, E: Engine> Session<'e, E> {
    pub fn new(engine: &'e E, grammar: &'e E::Grammar) -> Self {
        Self {
            engine,
            grammar,
            state: engine.initial_state(grammar),
        }
    }

    pub fn state(&self) -> &E::State {
        &self.state
    }

    /// Tokenize the next code line of the file.  On error, the state is left as it was.
    pub fn tokenize(
        &mut self,
        line_number: usize,
        text: &str,
    ) -> Result<TokenizedLine, TokenizationError> {
        let (line, state) =
            tokenize_line(self.engine, self.grammar, line_number, text, &self.state)?;
        self.state = state;
        Ok(line)
    }
}

/// Tokenize one line from `prior`, returning the tokenized line and the state for the next line
pub fn tokenize_line<E: Engine>(
    engine: &E,
    grammar: &E::Grammar,
    line_number: usize,
    text: &str,
    prior: &E::State,
) -> Result<(TokenizedLine, E::State), TokenizationError> {
    let (tokens, state) = engine
        .tokenize_line(grammar, text, prior)
        .map_err(|e| TokenizationError {
            line_number,
            message: e.to_string(),
        })?;
    let line = TokenizedLine {
        line_number,
        text: text.to_owned(),
        tokens: to_columns(text, tokens),
    };
    Ok((line, state))
}

/// Convert byte offsets into character columns
fn to_columns(text: &str, tokens: Vec<Token>) -> Vec<ColumnToken> {
    let char_count = text.chars().count();
    // `columns[b]` is the column of the char starting at byte `b`
    let mut columns = vec![char_count; text.len() + 1];
    for (column, (byte, _)) in text.char_indices().enumerate() {
        columns[byte] = column;
    }
    let column_of = |byte: usize| columns.get(byte).copied().unwrap_or(char_count);

    tokens
        .into_iter()
        .map(|tok| ColumnToken {
            start: column_of(tok.start),
            end: column_of(tok.end),
            scopes: tok.scopes,
        })
        .filter(|tok| tok.start < tok.end)
        .collect()
}

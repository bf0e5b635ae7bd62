use std::cmp::Reverse;

use itertools::Itertools;

/// A span of one line, along with every scope which applies to it.
///
/// Positions are **byte** indices into the line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    /// Scopes from outermost (always the grammar's root scope) to innermost
    pub scopes: Vec<String>,
}

impl Token {
    /// The most specific scope assigned to this token
    pub fn innermost_scope(&self) -> Option<&str> {
        self.scopes.last().map(String::as_str)
    }
}

/// Accumulates the [`Token`]s of one line.
///
/// **Invariant**: the tokens are contiguous, so each produced token starts where the previous one
/// ended (the first starts at 0).
#[derive(Debug, Clone, Default)]
pub(super) struct LineTokens {
    tokens: Vec<Token>,
    produced_up_to: usize,
}

impl LineTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the tokens up to (but not including) `end`, assigning `scopes` to the new span.
    /// Does nothing if `end` has already been reached.
    pub fn produce(&mut self, end: usize, scopes: &[String]) {
        if end <= self.produced_up_to {
            return;
        }
        self.tokens.push(Token {
            start: self.produced_up_to,
            end,
            scopes: scopes.to_vec(),
        });
        self.produced_up_to = end;
    }

    /// Produce the tokens for a regex match, splitting it wherever a named capture group starts
    /// or ends.  `groups[0]` is the whole match; capture groups can nest, in which case the
    /// inner group's scope is pushed on top of the outer group's.
    pub fn produce_captures(
        &mut self,
        groups: &[Option<(usize, usize)>],
        base_scopes: &[String],
        captures: &[(usize, String)],
    ) {
        let (start, end) = match groups.first().copied().flatten() {
            Some(range) => range,
            None => return,
        };
        // Non-empty capture ranges, sorted from outermost to innermost
        let ranges = captures
            .iter()
            .filter_map(|(idx, name)| {
                let (s, e) = groups.get(*idx).copied().flatten()?;
                (s < e && start <= s && e <= end).then(|| (s, e, name.as_str()))
            })
            .sorted_by_key(|&(s, e, _)| (s, Reverse(e)))
            .collect_vec();

        let boundaries = ranges
            .iter()
            .flat_map(|&(s, e, _)| [s, e])
            .chain([start, end])
            .sorted()
            .dedup()
            .collect_vec();
        for (&from, &to) in boundaries.iter().tuple_windows() {
            let mut scopes = base_scopes.to_vec();
            for &(_, _, name) in ranges.iter().filter(|&&(s, e, _)| s <= from && to <= e) {
                push_scopes(&mut scopes, Some(name));
            }
            self.produce(to, &scopes);
        }
    }

    /// Finish the line, dropping anything beyond `line_len` (i.e. the newline which is appended
    /// to every line before matching).
    pub fn finish(self, line_len: usize) -> Vec<Token> {
        self.tokens
            .into_iter()
            .filter(|tok| tok.start < line_len)
            .map(|tok| Token {
                end: tok.end.min(line_len),
                ..tok
            })
            .collect()
    }
}

/// Push the (possibly several, space-separated) scopes of a rule `name` onto `scopes`
pub(super) fn push_scopes(scopes: &mut Vec<String>, name: Option<&str>) {
    if let Some(name) = name {
        scopes.extend(name.split_whitespace().map(str::to_owned));
    }
}

//! Tokenization of single lines, threading a [`RuleStack`] from each line to the next.
//!
//! This follows the TextMate model: at every position, every rule which can match in the current
//! context is tried, and the earliest match wins (ties go to whichever rule comes first, with the
//! `end` of the enclosing region counted as coming before its `patterns`).  `begin`/`end` rules
//! push and pop frames of the [`RuleStack`], which is how a region like a block comment carries
//! over onto the following lines.

mod line_tokens;

use std::borrow::Cow;

use regex::Regex;

use crate::{grammar::compile_regex, EndPattern, Grammar, RuleId, RuleInner};

use self::line_tokens::{push_scopes, LineTokens};

pub use self::line_tokens::Token;

/// The deepest that `begin`/`end` regions can nest before tokenization gives up.  Grammars which
/// hit this are almost always pushing a region without consuming any text.
pub const MAX_STACK_DEPTH: usize = 128;

/// Where tokenization left off at the end of a line: the stack of `begin`/`end` regions which
/// are still open.  The bottom frame is always the grammar root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStack {
    /// **Invariant**: never empty
    frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    rule: RuleId,
    /// Scopes of the delimiters of this region: the parent's content scopes plus this rule's
    /// `name`
    scopes: Vec<String>,
    /// Scopes of everything between the delimiters: `scopes` plus this rule's `contentName`
    content_scopes: Vec<String>,
    /// The `end` regex with the `begin` captures substituted in, if it has back-references
    end_source: Option<String>,
    /// Byte index in the current line where this region was opened.  This is always `None`
    /// between lines.
    entered_at: Option<usize>,
}

impl RuleStack {
    /// The state at the very start of a file
    pub fn initial(grammar: &Grammar) -> Self {
        let scopes = vec![grammar.scope_name().to_owned()];
        Self {
            frames: vec![Frame {
                rule: grammar.root(),
                content_scopes: scopes.clone(),
                scopes,
                end_source: None,
                entered_at: None,
            }],
        }
    }

    /// How many frames are on the stack (`1` means only the root is open)
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The scopes which unmatched text would currently be given
    pub fn scopes(&self) -> &[String] {
        &self.top().content_scopes
    }

    fn top(&self) -> &Frame {
        // `frames` always contains the root
        &self.frames[self.frames.len() - 1]
    }
}

/// The result of tokenizing one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine {
    /// Contiguous tokens covering the whole line, in order.  Empty only for an empty line.
    pub tokens: Vec<Token>,
    /// The state to tokenize the next line with
    pub state: RuleStack,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenizeError {
    /// Regions nested deeper than [`MAX_STACK_DEPTH`]
    #[error("regions nested deeper than {} at byte {index}", MAX_STACK_DEPTH)]
    StackOverflow { index: usize },
    /// An `end` regex became invalid once the `begin` captures were substituted into it
    #[error("`end` regex {regex:?} doesn't compile: {inner}")]
    EndRegex { regex: String, inner: regex::Error },
    /// The [`RuleStack`] refers to rules which this [`Grammar`] doesn't have
    #[error("rule stack was not created by this grammar")]
    ForeignState,
}

/// A rule which matched, and the byte ranges of its capture groups
#[derive(Debug)]
struct Found {
    kind: FoundKind,
    /// `groups[0]` is the whole match, so is always `Some`
    groups: Vec<Option<(usize, usize)>>,
}

#[derive(Debug, Clone, Copy)]
enum FoundKind {
    /// The `end` of the innermost open region
    End,
    Match(RuleId),
    Begin(RuleId),
}

impl Found {
    fn range(&self) -> (usize, usize) {
        self.groups.first().copied().flatten().unwrap_or((0, 0))
    }

    fn is_empty(&self) -> bool {
        let (start, end) = self.range();
        start == end
    }
}

impl Grammar {
    /// Tokenize one line (without its line terminator), starting from the state left behind by
    /// the previous line.
    pub fn tokenize_line(
        &self,
        line: &str,
        prior: &RuleStack,
    ) -> Result<TokenizedLine, TokenizeError> {
        if prior.frames.iter().any(|f| f.rule.index() >= self.rules.len()) {
            return Err(TokenizeError::ForeignState);
        }

        // Grammars are written expecting each line to end with a newline (e.g. `\n` in
        // patterns), so match against that and clip it off the tokens afterwards
        let haystack = format!("{}\n", line);
        let mut stack = prior.clone();
        let mut tokens = LineTokens::new();
        let mut pos = 0;

        loop {
            let found = match self.next_match(stack.top(), &haystack, pos)? {
                Some(found) => found,
                None => {
                    tokens.produce(haystack.len(), stack.scopes());
                    break;
                }
            };
            let (start, end) = found.range();
            tokens.produce(start, stack.scopes());

            match found.kind {
                FoundKind::End => {
                    let frame = match stack.frames.pop() {
                        Some(frame) => frame,
                        None => break,
                    };
                    let captures = self.end_captures(frame.rule);
                    tokens.produce_captures(&found.groups, &frame.scopes, captures);
                    if found.is_empty() && frame.entered_at == Some(pos) {
                        // The region was opened and closed here without consuming anything, so
                        // matching again would loop forever
                        tokens.produce(haystack.len(), stack.scopes());
                        break;
                    }
                }
                FoundKind::Match(id) => {
                    let mut scopes = stack.scopes().to_vec();
                    push_scopes(&mut scopes, self.rules[id].name());
                    if let RuleInner::Match { captures, .. } = &self.rules[id].inner {
                        tokens.produce_captures(&found.groups, &scopes, captures);
                    }
                    if found.is_empty() {
                        tokens.produce(haystack.len(), stack.scopes());
                        break;
                    }
                }
                FoundKind::Begin(id) => {
                    let top = stack.top();
                    if found.is_empty() && top.rule == id && top.entered_at == Some(pos) {
                        tokens.produce(haystack.len(), stack.scopes());
                        break;
                    }
                    if stack.depth() >= MAX_STACK_DEPTH {
                        return Err(TokenizeError::StackOverflow { index: start });
                    }
                    let frame = self.open_region(id, &found, &haystack, &stack, &mut tokens);
                    stack.frames.push(Frame {
                        entered_at: Some(pos),
                        ..frame
                    });
                }
            }
            pos = end;
        }

        for frame in &mut stack.frames {
            frame.entered_at = None;
        }
        Ok(TokenizedLine {
            tokens: tokens.finish(line.len()),
            state: stack,
        })
    }

    /// Produce the tokens of a `begin` match, and build the frame for the region it opens
    fn open_region(
        &self,
        id: RuleId,
        found: &Found,
        haystack: &str,
        stack: &RuleStack,
        tokens: &mut LineTokens,
    ) -> Frame {
        let rule = &self.rules[id];
        let mut scopes = stack.scopes().to_vec();
        push_scopes(&mut scopes, rule.name());
        let mut content_scopes = scopes.clone();
        let mut end_source = None;
        if let RuleInner::BeginEnd(begin_end) = &rule.inner {
            tokens.produce_captures(&found.groups, &scopes, &begin_end.begin_captures);
            push_scopes(&mut content_scopes, begin_end.content_name());
            if let EndPattern::BackReferencing(source) = &begin_end.end {
                end_source = Some(substitute_back_references(source, &found.groups, haystack));
            }
        }
        Frame {
            rule: id,
            scopes,
            content_scopes,
            end_source,
            entered_at: None,
        }
    }

    /// Find the earliest match at or after `pos` of any rule that can match inside `frame`
    fn next_match(
        &self,
        frame: &Frame,
        haystack: &str,
        pos: usize,
    ) -> Result<Option<Found>, TokenizeError> {
        let end_regex = self.end_regex(frame)?;
        let end_last = match &self.rules[frame.rule].inner {
            RuleInner::BeginEnd(begin_end) => begin_end.apply_end_pattern_last,
            _ => false,
        };

        let mut candidates: Vec<(FoundKind, &Regex)> = Vec::new();
        let end_candidate = end_regex.as_deref().map(|regex| (FoundKind::End, regex));
        if !end_last {
            candidates.extend(end_candidate);
        }
        for &id in self.matchable_rules(frame.rule) {
            match &self.rules[id].inner {
                RuleInner::Match { regex, .. } => candidates.push((FoundKind::Match(id), regex)),
                RuleInner::BeginEnd(begin_end) => {
                    candidates.push((FoundKind::Begin(id), &begin_end.begin))
                }
                RuleInner::Group { .. } => {}
            }
        }
        if end_last {
            candidates.extend(end_candidate);
        }

        let mut best: Option<Found> = None;
        for (kind, regex) in candidates {
            let caps = match regex.captures_at(haystack, pos) {
                Some(caps) => caps,
                None => continue,
            };
            let start = caps.get(0).map_or(usize::MAX, |m| m.start());
            if best.as_ref().map_or(true, |b| start < b.range().0) {
                let groups = caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect();
                best = Some(Found { kind, groups });
                if start == pos {
                    break; // Nothing later in the list can match any earlier than this
                }
            }
        }
        Ok(best)
    }

    /// The regex which closes the region of `frame`, or `None` for the root
    fn end_regex(&self, frame: &Frame) -> Result<Option<Cow<'_, Regex>>, TokenizeError> {
        let begin_end = match &self.rules[frame.rule].inner {
            RuleInner::BeginEnd(begin_end) => begin_end,
            _ => return Ok(None),
        };
        let source = match (&begin_end.end, &frame.end_source) {
            (_, Some(source)) => source.clone(),
            (EndPattern::Fixed(regex), None) => return Ok(Some(Cow::Borrowed(regex))),
            (EndPattern::BackReferencing(source), None) => {
                substitute_back_references(source, &[], "")
            }
        };
        compile_regex(&source)
            .map(|regex| Some(Cow::Owned(regex)))
            .map_err(|inner| TokenizeError::EndRegex {
                regex: source,
                inner,
            })
    }

    fn end_captures(&self, id: RuleId) -> &[(usize, String)] {
        match &self.rules[id].inner {
            RuleInner::BeginEnd(begin_end) => &begin_end.end_captures,
            _ => &[],
        }
    }
}

/// Replace every back-reference (`\1`, `\2`, ...) in `source` with the escaped text of that
/// capture group.  Groups which didn't participate in the match are replaced with nothing.
pub(crate) fn substitute_back_references(
    source: &str,
    groups: &[Option<(usize, usize)>],
    haystack: &str,
) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        if digits.is_empty() {
            out.push('\\');
            out.extend(chars.next());
            continue;
        }
        let text = digits
            .parse::<usize>()
            .ok()
            .and_then(|idx| groups.get(idx).copied().flatten())
            .and_then(|(s, e)| haystack.get(s..e))
            .unwrap_or("");
        out.push_str(&regex::escape(text));
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RuleStack, Token, MAX_STACK_DEPTH};
    use crate::{Grammar, SpecGrammar, TokenizeError};

    fn grammar(value: serde_json::Value) -> Grammar {
        serde_json::from_value::<SpecGrammar>(value)
            .unwrap()
            .into_grammar()
            .unwrap()
    }

    /// A cut-down C-like grammar
    fn c_like() -> Grammar {
        grammar(json!({
            "scopeName": "source.c",
            "patterns": [
                { "include": "#comments" },
                { "match": "\\b(if|else|while)\\b", "name": "keyword.control.c" },
                {
                    "begin": "\"",
                    "end": "\"",
                    "name": "string.quoted.double.c",
                    "beginCaptures": { "0": { "name": "punctuation.definition.string.begin.c" } },
                    "endCaptures": { "0": { "name": "punctuation.definition.string.end.c" } },
                    "patterns": [{ "match": "\\\\.", "name": "constant.character.escape.c" }]
                },
                {
                    "match": "(fn)\\s+(\\w+)",
                    "captures": {
                        "1": { "name": "storage.type.function.c" },
                        "2": { "name": "entity.name.function.c" }
                    }
                }
            ],
            "repository": {
                "comments": {
                    "patterns": [
                        { "match": "//.*$", "name": "comment.line.double-slash.c" },
                        { "begin": "/\\*", "end": "\\*/", "name": "comment.block.c" }
                    ]
                }
            }
        }))
    }

    /// Text and innermost scope of every token
    fn summarise<'l>(line: &'l str, tokens: &[Token]) -> Vec<(&'l str, String)> {
        tokens
            .iter()
            .map(|t| (&line[t.start..t.end], t.innermost_scope().unwrap().to_owned()))
            .collect()
    }

    #[test]
    fn line_comment() {
        let g = c_like();
        let line = "// comment";
        let result = g.tokenize_line(line, &RuleStack::initial(&g)).unwrap();
        assert_eq!(
            result.tokens,
            vec![Token {
                start: 0,
                end: 10,
                scopes: vec!["source.c".to_owned(), "comment.line.double-slash.c".to_owned()],
            }]
        );
        assert_eq!(result.state, RuleStack::initial(&g));
    }

    #[test]
    fn tokens_cover_the_line() {
        let g = c_like();
        let line = "  if x else \"a\\nb\" // done";
        let result = g.tokenize_line(line, &RuleStack::initial(&g)).unwrap();
        let mut expected_start = 0;
        for tok in &result.tokens {
            assert_eq!(tok.start, expected_start);
            assert!(tok.end > tok.start);
            expected_start = tok.end;
        }
        assert_eq!(expected_start, line.len());
        assert_eq!(
            summarise(line, &result.tokens),
            vec![
                ("  ", "source.c".to_owned()),
                ("if", "keyword.control.c".to_owned()),
                (" x ", "source.c".to_owned()),
                ("else", "keyword.control.c".to_owned()),
                (" ", "source.c".to_owned()),
                ("\"", "punctuation.definition.string.begin.c".to_owned()),
                ("a", "string.quoted.double.c".to_owned()),
                ("\\n", "constant.character.escape.c".to_owned()),
                ("b", "string.quoted.double.c".to_owned()),
                ("\"", "punctuation.definition.string.end.c".to_owned()),
                (" ", "source.c".to_owned()),
                ("// done", "comment.line.double-slash.c".to_owned()),
            ]
        );
    }

    #[test]
    fn captures_split_tokens() {
        let g = c_like();
        let line = "fn main";
        let result = g.tokenize_line(line, &RuleStack::initial(&g)).unwrap();
        assert_eq!(
            summarise(line, &result.tokens),
            vec![
                ("fn", "storage.type.function.c".to_owned()),
                (" ", "source.c".to_owned()),
                ("main", "entity.name.function.c".to_owned()),
            ]
        );
    }

    #[test]
    fn block_comment_carries_over_lines() {
        let g = c_like();
        let initial = RuleStack::initial(&g);

        let first = g.tokenize_line("x /* open", &initial).unwrap();
        assert_eq!(first.state.depth(), 2);
        assert_eq!(first.state.scopes().last().unwrap(), "comment.block.c");

        // The same text means different things depending on the state it's tokenized from
        let carried = g.tokenize_line("if */ if", &first.state).unwrap();
        let fresh = g.tokenize_line("if */ if", &initial).unwrap();
        assert_ne!(carried.tokens, fresh.tokens);
        assert_eq!(
            summarise("if */ if", &carried.tokens),
            vec![
                ("if ", "comment.block.c".to_owned()),
                ("*/", "comment.block.c".to_owned()),
                (" ", "source.c".to_owned()),
                ("if", "keyword.control.c".to_owned()),
            ]
        );
        assert_eq!(carried.state, initial);
    }

    #[test]
    fn empty_line_has_no_tokens() {
        let g = c_like();
        let result = g.tokenize_line("", &RuleStack::initial(&g)).unwrap();
        assert!(result.tokens.is_empty());
    }

    #[test]
    fn multibyte_text() {
        let g = c_like();
        let line = "\"héllo\" if";
        let result = g.tokenize_line(line, &RuleStack::initial(&g)).unwrap();
        // Tokens are byte ranges, so slicing must land on char boundaries
        assert_eq!(
            summarise(line, &result.tokens),
            vec![
                ("\"", "punctuation.definition.string.begin.c".to_owned()),
                ("héllo", "string.quoted.double.c".to_owned()),
                ("\"", "punctuation.definition.string.end.c".to_owned()),
                (" ", "source.c".to_owned()),
                ("if", "keyword.control.c".to_owned()),
            ]
        );
    }

    #[test]
    fn back_referencing_end() {
        let g = grammar(json!({
            "scopeName": "source.sh",
            "patterns": [{
                "begin": "<<(\\w+)",
                "end": "^\\1$",
                "name": "string.unquoted.heredoc.sh"
            }]
        }));
        let initial = RuleStack::initial(&g);
        let open = g.tokenize_line("cat <<EOF", &initial).unwrap();
        assert_eq!(open.state.depth(), 2);
        // A different word doesn't close the heredoc
        let body = g.tokenize_line("END", &open.state).unwrap();
        assert_eq!(body.state.depth(), 2);
        let close = g.tokenize_line("EOF", &body.state).unwrap();
        assert_eq!(close.state, initial);
        assert_eq!(
            close.tokens[0].innermost_scope(),
            Some("string.unquoted.heredoc.sh")
        );
    }

    #[test]
    fn content_name_and_apply_end_pattern_last() {
        let g = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{
                "begin": "\\[",
                "end": "\\]",
                "name": "meta.brackets.t",
                "contentName": "meta.inside.t",
                "applyEndPatternLast": 1,
                "patterns": [{ "match": "\\]\\]", "name": "constant.escape.t" }]
            }]
        }));
        let line = "[a]]b]";
        let result = g.tokenize_line(line, &RuleStack::initial(&g)).unwrap();
        assert_eq!(
            summarise(line, &result.tokens),
            vec![
                ("[", "meta.brackets.t".to_owned()),
                ("a", "meta.inside.t".to_owned()),
                ("]]", "constant.escape.t".to_owned()),
                ("b", "meta.inside.t".to_owned()),
                ("]", "meta.brackets.t".to_owned()),
            ]
        );
    }

    #[test]
    fn zero_width_rules_terminate() {
        let g = grammar(json!({
            "scopeName": "source.t",
            "patterns": [
                { "match": "(?:)", "name": "empty.t" },
                { "begin": "(?:)", "end": "(?:)", "name": "region.t" }
            ]
        }));
        let result = g.tokenize_line("abc", &RuleStack::initial(&g)).unwrap();
        assert_eq!(result.tokens.len(), 1);
        assert_eq!((result.tokens[0].start, result.tokens[0].end), (0, 3));
        assert_eq!(result.state.depth(), 1);
    }

    #[test]
    fn runaway_nesting_is_an_error() {
        let g = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "include": "#open" }],
            "repository": {
                "open": {
                    "begin": "\\(",
                    "end": "\\)",
                    "patterns": [{ "include": "#open" }]
                }
            }
        }));
        let line = "(".repeat(MAX_STACK_DEPTH + 1);
        assert!(matches!(
            g.tokenize_line(&line, &RuleStack::initial(&g)),
            Err(TokenizeError::StackOverflow { .. })
        ));
    }

    #[test]
    fn substitute_back_references() {
        let haystack = "<<a.b";
        let groups = [Some((0, 5)), Some((2, 5))];
        assert_eq!(
            super::substitute_back_references(r"^\1$", &groups, haystack),
            r"^a\.b$"
        );
        assert_eq!(super::substitute_back_references(r"\2x\*", &groups, haystack), r"x\*");
    }
}

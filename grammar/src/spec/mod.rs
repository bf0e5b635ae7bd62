//! Specification for the JSON files which define grammars.  This can be roughly thought of as an
//! 'AST' for the grammar files.
//!
//! Loading a grammar happens in the following stages:
//! 1. Read the `*.tmLanguage.json` file containing that language's grammar
//! 2. Deserialize that JSON into a [`SpecGrammar`]
//! 3. Compile that [`SpecGrammar`] into a full [`Grammar`], which the tokenizer uses directly
//!
//! All these stages can generate errors, which are all bubbled up to the caller

pub(crate) mod convert;

use std::collections::HashMap;

use serde::Deserialize;

use crate::Grammar;

pub use self::convert::{ConvertError, ConvertResult};

type RepositoryName = String;
type Repository = HashMap<RepositoryName, SpecRule>;

/// A simplified version of [`Grammar`] which can be [`Deserialize`]d from the TextMate JSON
/// format.  The only exported method is [`into_grammar`](SpecGrammar::into_grammar), which checks
/// the source data and returns a [`Grammar`] assigning the same scopes as the source
/// `SpecGrammar`.
///
/// Keys which only matter to editors (`name`, `fileTypes`, `firstLineMatch`, ...) are
/// accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecGrammar {
    scope_name: String,
    #[serde(default)]
    patterns: Vec<SpecRule>,
    #[serde(default)]
    repository: Repository,
}

impl SpecGrammar {
    /// The root scope that this grammar declares itself as
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    #[inline]
    pub fn into_grammar(self) -> ConvertResult<Grammar> {
        convert::convert(self)
    }
}

/// One entry of a `patterns` list or a `repository`.  Which fields are set determines what kind
/// of rule this is:
/// - `include`: splices in another rule's patterns (`#name`, `$self` or `$base`)
/// - `match`: a single-line regex
/// - `begin` + `end`: a region, possibly spanning many lines
/// - only `patterns`: a group of rules
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpecRule {
    include: Option<String>,

    name: Option<String>,
    content_name: Option<String>,

    #[serde(rename = "match")]
    match_regex: Option<String>,
    begin: Option<String>,
    end: Option<String>,

    /// Scopes for capture groups of `match`, or of both `begin` and `end` if they don't specify
    /// their own
    #[serde(default)]
    captures: HashMap<String, SpecCapture>,
    #[serde(default)]
    begin_captures: HashMap<String, SpecCapture>,
    #[serde(default)]
    end_captures: HashMap<String, SpecCapture>,

    #[serde(default)]
    patterns: Vec<SpecRule>,
    /// Rules which can be `include`d by this rule and its descendants (shadowing entries of the
    /// same name further out)
    #[serde(default)]
    repository: Repository,

    #[serde(default)]
    apply_end_pattern_last: Option<Flag>,
    #[serde(default)]
    disabled: Option<Flag>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SpecCapture {
    name: Option<String>,
}

/// Boolean-ish values, which grammars in the wild write as either `true` or `1`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub(crate) enum Flag {
    Bool(bool),
    Int(u64),
}

impl Flag {
    fn is_set(flag: Option<Flag>) -> bool {
        match flag {
            Some(Flag::Bool(b)) => b,
            Some(Flag::Int(n)) => n != 0,
            None => false,
        }
    }
}

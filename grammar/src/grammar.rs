use std::fmt::{Debug, Formatter};

use index_vec::{IndexSlice, IndexVec};
use regex::{Regex, RegexBuilder};

/// A complete, compiled specification of how to assign scopes to the lines of one language.
#[derive(Debug, Clone)]
pub struct Grammar {
    /// The root scope of the language (e.g. `source.collie`).  Every token produced by this
    /// `Grammar` has this as its outermost scope.
    scope_name: String,
    root: RuleId,
    pub(crate) rules: IndexVec<RuleId, Rule>,

    /* LOOK-UP TABLES FOR THE TOKENIZER */
    /// For every [`Rule`], the rules which can match **inside** it, in priority order.  This is
    /// the rule's `patterns` with all the `include`s and pattern groups expanded, so it only ever
    /// contains [`RuleInner::Match`] and [`RuleInner::BeginEnd`] rules.
    pub(crate) matchable: IndexVec<RuleId, Vec<RuleId>>,
}

impl Grammar {
    pub(crate) fn new(scope_name: String, root: RuleId, rules: IndexVec<RuleId, Rule>) -> Self {
        let matchable = rules
            .indices()
            .map(|id| expand_patterns(&rules, id))
            .collect();
        Self {
            scope_name,
            root,
            rules,
            matchable,
        }
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    pub fn root(&self) -> RuleId {
        self.root
    }

    pub fn rules(&self) -> &IndexSlice<RuleId, [Rule]> {
        &self.rules
    }

    pub fn get_rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    /// The rules which are tried (in order) when the tokenizer is inside the rule `id`
    pub fn matchable_rules(&self, id: RuleId) -> &[RuleId] {
        &self.matchable[id]
    }
}

/// Flatten the `patterns` of a rule, following pattern groups (which includes resolved
/// `include`s) until only rules which actually match text are left.
fn expand_patterns(rules: &IndexSlice<RuleId, [Rule]>, id: RuleId) -> Vec<RuleId> {
    let mut out = Vec::new();
    // Groups already expanded.  `include`s can form cycles (e.g. `$self` inside a repository
    // entry), and a group which has been expanded once can't contribute any new rules.
    let mut expanded = vec![id];
    for &child in rules[id].inner.child_patterns() {
        expand_into(rules, child, &mut expanded, &mut out);
    }
    out
}

fn expand_into(
    rules: &IndexSlice<RuleId, [Rule]>,
    id: RuleId,
    expanded: &mut Vec<RuleId>,
    out: &mut Vec<RuleId>,
) {
    match &rules[id].inner {
        RuleInner::Group { patterns } => {
            if expanded.contains(&id) {
                return;
            }
            expanded.push(id);
            for &child in patterns {
                expand_into(rules, child, expanded, out);
            }
        }
        RuleInner::Match { .. } | RuleInner::BeginEnd(_) => {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
}

///////////
// RULES //
///////////

#[derive(Debug, Clone)]
pub struct Rule {
    /// The scope(s) assigned to everything this rule matches.  TextMate allows several
    /// space-separated scopes here, which are pushed outermost first.
    pub(crate) name: Option<String>,
    pub(crate) inner: RuleInner,
}

impl Rule {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn inner(&self) -> &RuleInner {
        &self.inner
    }
}

#[derive(Debug, Clone)]
pub enum RuleInner {
    /// A rule which never matches anything itself, but contributes its `patterns` to whichever
    /// rule includes it.  The grammar root, `patterns`-only repository entries and repository
    /// entries which are just an `include` all become groups.
    Group { patterns: Vec<RuleId> },
    /// A single regex, matched within one line
    Match { regex: Regex, captures: Captures },
    /// A region which starts with one regex and continues (possibly over many lines) until
    /// another regex matches
    BeginEnd(BeginEnd),
}

impl RuleInner {
    /// The (unexpanded) patterns which can match inside this rule
    pub fn child_patterns(&self) -> &[RuleId] {
        match self {
            RuleInner::Group { patterns } => patterns,
            RuleInner::BeginEnd(begin_end) => &begin_end.patterns,
            RuleInner::Match { .. } => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BeginEnd {
    /// Scope(s) assigned to the text **between** the `begin` and `end` matches
    pub(crate) content_name: Option<String>,
    pub(crate) begin: Regex,
    pub(crate) end: EndPattern,
    pub(crate) begin_captures: Captures,
    pub(crate) end_captures: Captures,
    pub(crate) patterns: Vec<RuleId>,
    /// If `true`, the `end` regex loses ties against the `patterns` instead of winning them
    pub(crate) apply_end_pattern_last: bool,
}

impl BeginEnd {
    pub fn content_name(&self) -> Option<&str> {
        self.content_name.as_deref()
    }
}

/// The regex which closes a [`BeginEnd`] region
#[derive(Clone)]
pub enum EndPattern {
    /// The `end` regex doesn't depend on what `begin` matched, so it's compiled up-front
    Fixed(Regex),
    /// The `end` regex refers to groups captured by `begin` (e.g. `\1` to close a heredoc with
    /// the same word that opened it).  This is the **source** of the regex, with the
    /// back-references still in place; it's compiled once the `begin` match is known.
    BackReferencing(String),
}

impl Debug for EndPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EndPattern::Fixed(regex) => write!(f, "Fixed({})", regex.as_str()),
            EndPattern::BackReferencing(source) => write!(f, "BackReferencing({})", source),
        }
    }
}

/// Maps capture group indices to the scope(s) assigned to that group, sorted by group index
pub type Captures = Vec<(usize, String)>;

/// Compile a regex the way TextMate grammars expect: `^` and `$` match at line boundaries, not
/// just at the ends of the haystack.
pub(crate) fn compile_regex(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source).multi_line(true).build()
}

//////////////////
// HELPER TYPES //
//////////////////

index_vec::define_index_type! { pub struct RuleId = usize; }

pub type RuleVec<T> = IndexVec<RuleId, T>;

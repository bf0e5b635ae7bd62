use std::collections::HashMap;

use itertools::Itertools;
use regex::Regex;

use super::{Flag, Repository, SpecCapture, SpecGrammar, SpecRule};
use crate::{
    grammar::{self, compile_regex},
    BeginEnd, Captures, EndPattern, Grammar, RuleId, RuleInner, RuleVec,
};

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Convert a [`SpecGrammar`] (likely parsed from a JSON file) into a full [`Grammar`], or fail
/// with a [`ConvertError`].  Most of the work is resolving `include`s and compiling regexes; the
/// 'shapes' of the two are otherwise very similar.
pub(crate) fn convert(grammar: SpecGrammar) -> ConvertResult<Grammar> {
    let SpecGrammar {
        scope_name,
        patterns,
        repository,
    } = grammar;

    let mut builder = RuleBuilder::new();
    // The root is allocated first so that `$self` can refer to it while its patterns are still
    // being converted
    let root = builder.reserve();
    let mut repos = RepoStack::new(root);
    builder.convert_repository(repository, &mut repos)?;
    let patterns = builder.convert_patterns(patterns, "patterns", &repos)?;
    builder.set(root, None, RuleInner::Group { patterns });

    Ok(Grammar::new(scope_name, root, builder.into_rules()))
}

/// The possible ways that compiling a [`Grammar`] can fail.  `rule` is always a path through the
/// grammar file to the offending rule, e.g. `repository.strings/patterns[2]`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    #[error("rule `{rule}`: regex {regex:?} doesn't compile: {inner}")]
    Regex {
        rule: String,
        regex: String,
        inner: regex::Error,
    },
    #[error("rule `{rule}`: `include` of {include:?} doesn't name a repository entry")]
    UnknownInclude { rule: String, include: String },
    #[error("rule `{rule}`: `include` of other grammar {include:?} is not supported")]
    ExternalInclude { rule: String, include: String },
    #[error("rule `{rule}`: `begin` without an `end`")]
    MissingEnd { rule: String },
    #[error("rule `{rule}`: `end` without a `begin`")]
    MissingBegin { rule: String },
    #[error("rule `{rule}`: capture key {key:?} is not a group number")]
    CaptureIndex { rule: String, key: String },
}

///////////////////
// RULE BUILDING //
///////////////////

/// Accumulates [`grammar::Rule`]s, handing out [`RuleId`]s before the rules themselves are
/// finished (because rules can refer to each other in cycles).
#[derive(Debug, Default)]
struct RuleBuilder {
    rules: RuleVec<grammar::Rule>,
}

impl RuleBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Allocate a [`RuleId`] whose rule will be filled in later by [`RuleBuilder::set`]
    fn reserve(&mut self) -> RuleId {
        self.rules.push(grammar::Rule {
            name: None,
            inner: RuleInner::Group {
                patterns: Vec::new(),
            },
        })
    }

    fn set(&mut self, id: RuleId, name: Option<String>, inner: RuleInner) {
        self.rules[id] = grammar::Rule { name, inner };
    }

    fn into_rules(self) -> RuleVec<grammar::Rule> {
        self.rules
    }

    /// Assign IDs to every entry of a `repository` and convert them.  The repository stays on
    /// top of `repos` so that the caller can resolve its own patterns against it; the caller is
    /// responsible for popping it.
    fn convert_repository(
        &mut self,
        repository: Repository,
        repos: &mut RepoStack,
    ) -> ConvertResult<()> {
        // Sort so that rule IDs don't depend on `HashMap` iteration order
        let entries = repository
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .collect_vec();
        // Before converting any entry, assign all names to IDs (because entries may refer to
        // entries which come after themselves, or to themselves)
        let ids: HashMap<String, RuleId> = entries
            .iter()
            .map(|(name, _)| (name.clone(), self.reserve()))
            .collect();
        repos.push(ids.clone());
        for (name, rule) in entries {
            let path = format!("repository.{}", name);
            self.convert_into(ids[&name], rule, &path, repos)?;
        }
        Ok(())
    }

    fn convert_patterns(
        &mut self,
        patterns: Vec<SpecRule>,
        parent_path: &str,
        repos: &RepoStack,
    ) -> ConvertResult<Vec<RuleId>> {
        let mut repos = repos.clone();
        patterns
            .into_iter()
            .enumerate()
            .map(|(idx, rule)| {
                let path = format!("{}[{}]", parent_path, idx);
                self.convert_pattern(rule, &path, &mut repos)
            })
            .collect()
    }

    /// Convert a rule from a `patterns` list.  `include`s resolve directly to the included rule,
    /// so they don't create a new rule.
    fn convert_pattern(
        &mut self,
        rule: SpecRule,
        path: &str,
        repos: &mut RepoStack,
    ) -> ConvertResult<RuleId> {
        if let Some(include) = &rule.include {
            return repos.resolve(include, path);
        }
        let id = self.reserve();
        self.convert_into(id, rule, path, repos)?;
        Ok(id)
    }

    /// Convert a [`SpecRule`], storing the result at the (already reserved) `id`
    fn convert_into(
        &mut self,
        id: RuleId,
        rule: SpecRule,
        path: &str,
        repos: &mut RepoStack,
    ) -> ConvertResult<()> {
        let SpecRule {
            include,
            name,
            content_name,
            match_regex,
            begin,
            end,
            captures,
            begin_captures,
            end_captures,
            patterns,
            repository,
            apply_end_pattern_last,
            disabled,
        } = rule;

        if let Some(include) = include {
            let target = repos.resolve(&include, path)?;
            self.set(id, None, RuleInner::Group {
                patterns: vec![target],
            });
            return Ok(());
        }
        if Flag::is_set(disabled) {
            self.set(id, name, RuleInner::Group {
                patterns: Vec::new(),
            });
            return Ok(());
        }

        let has_repository = !repository.is_empty();
        if has_repository {
            self.convert_repository(repository, repos)?;
        }
        let patterns_path = format!("{}/patterns", path);

        let inner = match (match_regex, begin, end) {
            (Some(source), _, _) => RuleInner::Match {
                regex: compile(&source, path)?,
                captures: convert_captures(captures, path)?,
            },
            (None, Some(begin), Some(end)) => {
                // `captures` applies to whichever of `begin`/`end` doesn't have its own
                let begin_captures = if begin_captures.is_empty() {
                    convert_captures(captures.clone(), path)?
                } else {
                    convert_captures(begin_captures, path)?
                };
                let end_captures = if end_captures.is_empty() {
                    convert_captures(captures, path)?
                } else {
                    convert_captures(end_captures, path)?
                };
                RuleInner::BeginEnd(BeginEnd {
                    content_name,
                    begin: compile(&begin, path)?,
                    end: compile_end(&end, path)?,
                    begin_captures,
                    end_captures,
                    patterns: self.convert_patterns(patterns, &patterns_path, repos)?,
                    apply_end_pattern_last: Flag::is_set(apply_end_pattern_last),
                })
            }
            (None, Some(_), None) => {
                return Err(ConvertError::MissingEnd {
                    rule: path.to_owned(),
                })
            }
            (None, None, Some(_)) => {
                return Err(ConvertError::MissingBegin {
                    rule: path.to_owned(),
                })
            }
            (None, None, None) => RuleInner::Group {
                patterns: self.convert_patterns(patterns, &patterns_path, repos)?,
            },
        };

        if has_repository {
            repos.pop();
        }
        self.set(id, name, inner);
        Ok(())
    }
}

/// The repositories visible from the rule currently being converted, innermost last
#[derive(Debug, Clone)]
struct RepoStack {
    root: RuleId,
    repos: Vec<HashMap<String, RuleId>>,
}

impl RepoStack {
    fn new(root: RuleId) -> Self {
        Self {
            root,
            repos: Vec::new(),
        }
    }

    fn push(&mut self, repo: HashMap<String, RuleId>) {
        self.repos.push(repo);
    }

    fn pop(&mut self) {
        self.repos.pop();
    }

    fn resolve(&self, include: &str, path: &str) -> ConvertResult<RuleId> {
        if include == "$self" || include == "$base" {
            return Ok(self.root);
        }
        match include.strip_prefix('#') {
            Some(name) => self
                .repos
                .iter()
                .rev()
                .find_map(|repo| repo.get(name).copied())
                .ok_or_else(|| ConvertError::UnknownInclude {
                    rule: path.to_owned(),
                    include: include.to_owned(),
                }),
            None => Err(ConvertError::ExternalInclude {
                rule: path.to_owned(),
                include: include.to_owned(),
            }),
        }
    }
}

//////////////
// CAPTURES //
//////////////

fn convert_captures(captures: HashMap<String, SpecCapture>, path: &str) -> ConvertResult<Captures> {
    let mut out = captures
        .into_iter()
        .filter_map(|(key, capture)| capture.name.map(|name| (key, name)))
        .map(|(key, name)| match key.parse::<usize>() {
            Ok(idx) => Ok((idx, name)),
            Err(_) => Err(ConvertError::CaptureIndex {
                rule: path.to_owned(),
                key,
            }),
        })
        .collect::<ConvertResult<Captures>>()?;
    out.sort_by_key(|(idx, _)| *idx);
    Ok(out)
}

/////////////
// REGEXES //
/////////////

fn compile(source: &str, path: &str) -> ConvertResult<Regex> {
    let translated = translate_regex(source);
    compile_regex(&translated).map_err(|inner| ConvertError::Regex {
        rule: path.to_owned(),
        regex: source.to_owned(),
        inner,
    })
}

fn compile_end(source: &str, path: &str) -> ConvertResult<EndPattern> {
    let translated = translate_regex(source);
    if !has_back_references(&translated) {
        return compile(source, path).map(EndPattern::Fixed);
    }
    // Check that the regex is valid once the back-references are filled in, so that broken
    // grammars fail to load rather than failing halfway through a file
    let filled = crate::tokenizer::substitute_back_references(&translated, &[], "");
    compile_regex(&filled).map_err(|inner| ConvertError::Regex {
        rule: path.to_owned(),
        regex: source.to_owned(),
        inner,
    })?;
    Ok(EndPattern::BackReferencing(translated))
}

/// Rewrite the Oniguruma escapes which grammars commonly use into their equivalents in the
/// [`regex`] crate's syntax.  `\h` and `\H` are the hex-digit classes.
fn translate_regex(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('h') => out.push_str("[0-9a-fA-F]"),
            Some('H') => out.push_str("[^0-9a-fA-F]"),
            Some(escaped) => {
                out.push('\\');
                out.push(escaped);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Returns `true` if `source` contains a back-reference like `\1`
fn has_back_references(source: &str) -> bool {
    let mut chars = source.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(d) if d.is_ascii_digit() => return true,
                _ => {}
            }
        }
    }
    false
}

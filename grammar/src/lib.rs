//! Crate for loading TextMate-style grammars and assigning scopes to lines of text with them.
//!
//! This includes:
//! - The central [`Grammar`] data structure (in the [`grammar`] module)
//! - A deserializeable schema for the `*.tmLanguage.json` files (the [`spec`] module)
//! - Code for tokenizing lines of text into [`Token`]s, threading a [`RuleStack`] from one line
//!   to the next (in the [`tokenizer`] module)
//!
//! The engine implements the subset of TextMate grammars which syntax tests actually exercise:
//! `match`, `begin`/`end` (including back-references in `end`), `captures`, `contentName`,
//! `include` of repository entries and `$self`, and nested repositories.  Regexes are compiled
//! with the [`regex`] crate, so Oniguruma-only constructs like look-around are rejected when the
//! grammar is loaded rather than silently mis-matching.

#![allow(rustdoc::private_intra_doc_links)]

mod grammar;
pub mod spec;
pub mod tokenizer;

pub use grammar::*;
pub use spec::{ConvertError, SpecGrammar};
pub use tokenizer::{RuleStack, Token, TokenizeError, TokenizedLine};

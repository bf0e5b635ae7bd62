//! Engine-independent code for checking syntax-highlighting grammars against fixture files.
//!
//! A run loads one grammar, then for every fixture file tokenizes its code lines and checks each
//! assertion line against the tokens of the code line above it.  The results are collected into a
//! [`RunSummary`], which renders the human-readable report.

pub mod config; // Run configuration
pub mod discovery; // Finding fixture files
pub mod engine; // Boundary with the tokenizer
pub mod evaluate; // Checking one assertion
pub mod fixture; // Classifying fixture lines
pub mod loader; // Finding and compiling grammars
pub mod report; // Results and their rendering
pub mod runner; // Driving a whole run
pub mod session; // Per-file tokenizer state

pub use config::{Config, ConfigError};
pub use engine::{Engine, TextMateEngine};
pub use loader::{GrammarRegistry, LoadError};
pub use report::{FileReport, RunSummary};
pub use runner::Harness;

// scrubsh-core/src/lib.rs
//! # scrubsh Core Library
//!
//! `scrubsh-core` removes secrets from arbitrarily large, possibly binary, text
//! streams before they leave a trust boundary, such as a diagnostic bundle.
//!
//! Redaction is a chain of stream transformers. Each [`Redactor`] takes a byte
//! stream and a file path and returns a new stream; anything it does not match
//! passes through byte for byte, newlines included. Each redaction is written
//! to a [`RedactionLedger`], and with tokenization enabled the replacement is a
//! deterministic, typed token from a [`Tokenizer`] instead of a fixed mask.
//!
//! ## Modules
//!
//! * `config`: The YAML rule schema, built-in rules, merging and validation.
//! * `engine`: The `Redactor` trait and the shared `RedactorContext`.
//! * `engines`: Literal, single-line, multi-line and YAML-path redactors.
//! * `sanitizers`: Pattern compilation and the compiled regex cache.
//! * `line_reader`: Binary-safe line iteration that tracks trailing newlines.
//! * `stream`: The bounded producer/consumer hand-off between stages.
//! * `pipeline`: Folding a stream through a list of redactors.
//! * `ledger`: The record of every redaction, by rule and by file.
//! * `tokenizer`: Token generation, normalization, correlation and the token map.
//! * `redaction_match`: The redaction record and log helpers.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use scrubsh_core::{build_redactors, redact_bytes, RedactionConfig, RedactorContext};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = RedactionConfig::load_default_rules()?;
//! let ctx = RedactorContext::global();
//!
//! let path = "cluster-resources/pods.json";
//! let redactors = build_redactors(&config, path, &ctx)?;
//! let clean = redact_bytes(b"\"name\": \"DB_PASSWORD\"\n\"value\": \"hunter2\"\n".to_vec(), path, &redactors).await?;
//!
//! for (rule, hits) in ctx.ledger.snapshot().await.by_redactor {
//!     println!("{}: {}", rule, hits.len());
//! }
//! # let _ = clean;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Configuration problems are reported when redactors are built, as
//! [`ScrubError`] or `anyhow::Error` from rule loading. Problems with the
//! input itself reach whoever reads the redacted stream, as `std::io::Error`.
//! Input that is not valid YAML is not an error: the YAML redactor passes it
//! through.
//!
//! ---
//! License: MIT OR APACHE 2.0

pub mod config;
pub mod engine;
pub mod engines;
pub mod errors;
pub mod ledger;
pub mod line_reader;
pub mod pipeline;
pub mod redaction_match;
pub mod sanitizers;
pub mod stream;
pub mod tokenizer;

/// Re-exports the rule schema and the functions that load, merge and apply it.
pub use config::{build_redactors, merge_configs, FileSelector, RedactSpec, RedactionConfig, RegexRemoval, Removals};

/// Re-exports the custom error type for clear error reporting.
pub use errors::ScrubError;

/// Re-exports the redactor contract and its shared state.
pub use engine::{Redactor, RedactorContext, RuleInfo};

/// Re-exports the concrete redactors.
pub use engines::literal::LiteralRedactor;
pub use engines::multi_line::MultiLineRedactor;
pub use engines::single_line::{LineRedactor, SingleLineRedactor};
pub use engines::yaml::YamlRedactor;

pub use ledger::{LedgerSnapshot, RedactionLedger};
pub use pipeline::{redact_bytes, redact_stream, redact_with_config};
pub use redaction_match::{redact_sensitive, Redaction};
pub use sanitizers::compiler::{clear_regex_cache, CompiledPattern, Masker, MAX_PATTERN_LENGTH};
pub use stream::{stream_from_bytes, ByteStream};

/// Re-exports the tokenizer and its persisted map.
pub use tokenizer::classify::SecretType;
pub use tokenizer::map::{
    decrypt_map, encrypt_map, load_map, validate_map, validate_map_file, CacheStats, CorrelationGroup,
    DuplicateGroup, FileStats, RedactionMap, RedactionStats,
};
pub use tokenizer::{validate_token, Tokenizer, TokenizerConfig, MASK_TEXT, TOKENIZATION_ENV};

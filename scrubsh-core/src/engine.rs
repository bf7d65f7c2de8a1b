// scrubsh-core/src/engine.rs
//! Defines the core `Redactor` trait and the shared state redactors report to.
//!
//! Every redactor is a stream transformer: it takes a byte stream and the path
//! of the file it came from, and returns a stream of the redacted bytes.
//! Content a redactor does not match passes through byte for byte. Redactors
//! are composed left to right by [`crate::pipeline`].
//!
//! License: MIT OR APACHE 2.0

use std::sync::Arc;

use crate::ledger::RedactionLedger;
use crate::redaction_match::Redaction;
use crate::stream::ByteStream;
use crate::tokenizer::{Tokenizer, TokenizerConfig, MASK_TEXT};

/// A pluggable stream transformer.
pub trait Redactor: Send + Sync {
    /// The rule this redactor was built from.
    fn name(&self) -> &str;

    /// Returns the redacted form of `input`.
    ///
    /// The work happens on a spawned task, so this must be called from within
    /// a tokio runtime. Read errors from `input` reach the consumer of the
    /// returned stream.
    fn redact(&self, input: ByteStream, path: &str) -> ByteStream;
}

/// The ledger and tokenizer a redactor reports to.
#[derive(Debug, Clone)]
pub struct RedactorContext {
    pub ledger: RedactionLedger,
    pub tokenizer: Arc<Tokenizer>,
}

impl RedactorContext {
    pub fn new(ledger: RedactionLedger, tokenizer: Arc<Tokenizer>) -> Self {
        Self { ledger, tokenizer }
    }

    /// The process-wide ledger and tokenizer.
    pub fn global() -> Self {
        Self::new(RedactionLedger::global(), Tokenizer::global())
    }

    /// A fresh ledger and a fresh tokenizer, shared with nobody.
    pub fn isolated(tokenizer: TokenizerConfig) -> Self {
        Self::new(RedactionLedger::new(), Arc::new(Tokenizer::new(tokenizer)))
    }
}

/// Identity of the rule behind a redactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    pub name: String,
    pub mask_text: String,
    /// Whether the rule comes from the built-in catalogue.
    pub is_default: bool,
}

impl RuleInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mask_text: MASK_TEXT.to_string(),
            is_default: false,
        }
    }

    pub fn with_mask_text(mut self, mask_text: impl Into<String>) -> Self {
        self.mask_text = mask_text.into();
        self
    }

    pub fn builtin(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Records one redaction of `original_len` bytes into `replacement_len`.
    pub(crate) fn record(
        &self,
        ctx: &RedactorContext,
        original_len: usize,
        replacement_len: usize,
        line: usize,
        file: &str,
    ) {
        ctx.ledger.record(Redaction::new(
            &self.name,
            original_len,
            replacement_len,
            line,
            file,
            self.is_default,
        ));
    }
}

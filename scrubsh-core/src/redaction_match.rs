// scrubsh-core/src/redaction_match.rs
//! Provides the redaction record emitted by every redactor, and log helpers
//! that keep secret material out of debug output.

use serde::{Deserialize, Serialize};
use log::debug;

use lazy_static::lazy_static;

lazy_static! {
    /// A static boolean that is initialized once to determine if PII is allowed in debug logs.
    static ref PII_DEBUG_ALLOWED: bool = {
        std::env::var("SCRUBSH_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

/// One redaction performed by one rule on one file.
///
/// `characters_removed` is `original_len - replacement_len`, so it goes negative
/// when the replacement is longer than what it replaced. `line` is 1-based, or 0
/// when the redactor does not work on lines (YAML documents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redaction {
    pub redactor_name: String,
    pub characters_removed: i64,
    pub line: usize,
    pub file: String,
    pub is_default_redactor: bool,
}

impl Redaction {
    pub fn new(
        redactor_name: &str,
        original_len: usize,
        replacement_len: usize,
        line: usize,
        file: &str,
        is_default_redactor: bool,
    ) -> Self {
        Self {
            redactor_name: redactor_name.to_string(),
            characters_removed: original_len as i64 - replacement_len as i64,
            line,
            file: file.to_string(),
            is_default_redactor,
        }
    }
}

pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

fn get_loggable_content(sensitive_content: &str) -> String {
    if *PII_DEBUG_ALLOWED {
        sensitive_content.to_string()
    } else {
        redact_sensitive(sensitive_content)
    }
}

pub fn log_redaction_debug(module_path: &str, redaction: &Redaction) {
    debug!(
        "{} Recorded redaction: Rule='{}', File='{}', Line={}, Removed={}",
        module_path,
        redaction.redactor_name,
        redaction.file,
        redaction.line,
        redaction.characters_removed
    );
}

pub fn log_tokenization_debug(module_path: &str, original_sensitive_content: &str, token: &str, context: &str) {
    debug!(
        "{} Tokenized value: Original='{}', Token='{}', Context='{}'",
        module_path,
        get_loggable_content(original_sensitive_content),
        token,
        context
    );
}

//! Secret type classification.
//!
//! The rule context (a rule name, or the selector line of a paired redaction)
//! is checked first, most specific type first. The value's shape is checked
//! next, then the value's text, then the configured default.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The type segment of a token, e.g. the `PASSWORD` in `***TOKEN_PASSWORD_A1B2C3***`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecretType {
    Password,
    #[serde(rename = "APIKEY")]
    ApiKey,
    Database,
    Email,
    Ip,
    Token,
    Secret,
    Key,
    Credential,
    Auth,
    Generic,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::Password => "PASSWORD",
            SecretType::ApiKey => "APIKEY",
            SecretType::Database => "DATABASE",
            SecretType::Email => "EMAIL",
            SecretType::Ip => "IP",
            SecretType::Token => "TOKEN",
            SecretType::Secret => "SECRET",
            SecretType::Key => "KEY",
            SecretType::Credential => "CREDENTIAL",
            SecretType::Auth => "AUTH",
            SecretType::Generic => "GENERIC",
        }
    }

    /// Parses the type segment of a token.
    pub fn from_token_segment(segment: &str) -> Option<Self> {
        CONTEXT_PRIORITY
            .iter()
            .chain([SecretType::Email, SecretType::Ip, SecretType::Auth, SecretType::Generic].iter())
            .copied()
            .find(|t| t.as_str() == segment)
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context checks run in this order; `Key` is the most general and goes last.
const CONTEXT_PRIORITY: [SecretType; 7] = [
    SecretType::ApiKey,
    SecretType::Password,
    SecretType::Database,
    SecretType::Credential,
    SecretType::Secret,
    SecretType::Token,
    SecretType::Key,
];

static CONTEXT_PATTERNS: Lazy<Vec<(SecretType, Regex)>> = Lazy::new(|| {
    [
        (SecretType::ApiKey, r"(?i)api.?key|apikey|access.?key"),
        (SecretType::Password, r"(?i)password|passwd|pwd"),
        (SecretType::Database, r"(?i)database|db.?(url|uri|host|pass|connection)"),
        (SecretType::Credential, r"(?i)credential|cred|auth"),
        (SecretType::Secret, r"(?i)secret|private.?key"),
        (SecretType::Token, r"(?i)token|bearer|jwt|oauth"),
        (SecretType::Key, r"(?i)key|cert|certificate"),
    ]
    .into_iter()
    .map(|(t, p)| (t, Regex::new(p).expect("classification pattern is valid")))
    .collect()
});

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid"));

static RE_IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("ipv4 pattern is valid"));

/// Determines the token type for `value` seen under `context`.
pub fn classify(context: &str, value: &str, default: SecretType) -> SecretType {
    debug_assert_eq!(CONTEXT_PATTERNS.len(), CONTEXT_PRIORITY.len());

    if let Some((t, _)) = CONTEXT_PATTERNS.iter().find(|(_, re)| re.is_match(context)) {
        return *t;
    }

    if RE_EMAIL.is_match(value) {
        return SecretType::Email;
    }
    if RE_IPV4.is_match(value) {
        return SecretType::Ip;
    }

    let value_lower = value.to_lowercase();
    CONTEXT_PRIORITY
        .iter()
        .copied()
        .find(|t| value_lower.contains(&t.as_str().to_lowercase()))
        .unwrap_or(default)
}

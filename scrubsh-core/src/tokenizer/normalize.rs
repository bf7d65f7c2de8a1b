//! Normalization of secret values before lookup and hashing, so that
//! superficially different renderings of one secret share a token.

use once_cell::sync::Lazy;
use regex::Regex;

/// Prefixes that do not change what a secret is. Only the first match is stripped.
const STRIPPED_PREFIXES: [&str; 6] = ["Bearer ", "Basic ", "Token ", "API_KEY=", "PASSWORD=", "SECRET="];

/// Values shorter than this that are purely alphabetic look like user names.
const SHORT_VALUE_LEN: usize = 8;

static RE_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z]+$").expect("alpha pattern is valid"));
static RE_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*:\s*").expect("colon pattern is valid"));
static RE_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*@\s*").expect("at pattern is valid"));

pub fn normalize_secret(value: &str) -> String {
    let mut value = value.trim().to_string();

    if value.len() < SHORT_VALUE_LEN && RE_ALPHA.is_match(&value) {
        value = value.to_lowercase();
    }

    if let Some(stripped) = STRIPPED_PREFIXES.iter().find_map(|p| value.strip_prefix(p)) {
        value = stripped.to_string();
    }

    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        value = value[1..value.len() - 1].to_string();
    }

    let value = RE_COLON.replace_all(&value, ":");
    RE_AT.replace_all(&value, "@").into_owned()
}

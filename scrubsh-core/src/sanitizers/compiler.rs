//! compiler.rs - Compiles redaction patterns and caches the compiled regexes.
//!
//! A redaction pattern is a regular expression whose capture groups carry a
//! role. The role is resolved once, at compile time, into a list of
//! substitution steps:
//!
//! * an unnamed group is echoed verbatim,
//! * a group named `mask` is replaced with mask text (or a token),
//! * a group named `drop` is removed,
//! * any other named group is echoed verbatim.
//!
//! The replacement for a match is the concatenation of those steps, so text
//! inside a match that is not covered by a group does not survive.
//!
//! Compiled regexes live in a thread-safe, global cache keyed by pattern text.
//! The cache is cleared together with the redaction ledger.
//!
//! License: MIT OR APACHE 2.0

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use log::debug;
use regex::bytes::{Captures, Regex, RegexBuilder};

use crate::errors::ScrubError;
use crate::tokenizer::Tokenizer;

/// Maximum allowed length for a regex pattern string.
pub const MAX_PATTERN_LENGTH: usize = 4096;

/// Suffix appended to repeated group names so the regex engine accepts them.
const DUPLICATE_GROUP_MARKER: &str = "__dup";

lazy_static! {
    /// A thread-safe, global cache for compiled regexes, keyed by pattern text.
    static ref REGEX_CACHE: RwLock<HashMap<String, Arc<Regex>>> = RwLock::new(HashMap::new());

    /// Finds `(?P<name>` and `(?<name>` group openers in a pattern.
    static ref GROUP_NAME_RE: regex::Regex =
        regex::Regex::new(r"\(\?P?<([A-Za-z_][A-Za-z0-9_]*)>").expect("group name regex is valid");
}

/// Gets a compiled regex from the cache or compiles it if not found.
///
/// Invalid syntax is reported against `rule_name` and never retried.
pub fn compile_regex(rule_name: &str, pattern: &str) -> Result<Arc<Regex>, ScrubError> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(ScrubError::PatternLengthExceeded(
            rule_name.to_string(),
            pattern.len(),
            MAX_PATTERN_LENGTH,
        ));
    }

    {
        let cache = REGEX_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = cache.get(pattern) {
            return Ok(Arc::clone(regex));
        }
    }

    debug!("Compiling pattern for rule '{}'.", rule_name);
    let regex = RegexBuilder::new(&disambiguate_group_names(pattern))
        .size_limit(10 * (1 << 20)) // 10 MB limit for compiled regex
        .build()
        .map_err(|e| ScrubError::RuleCompilationError(rule_name.to_string(), e))?;
    let regex = Arc::new(regex);

    REGEX_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(pattern.to_string(), Arc::clone(&regex));
    Ok(regex)
}

/// Drops every cached regex.
pub fn clear_regex_cache() {
    let mut cache = REGEX_CACHE.write().unwrap_or_else(PoisonError::into_inner);
    debug!("Clearing {} cached regexes.", cache.len());
    cache.clear();
}

/// Renames the second and later occurrences of a group name.
///
/// Rule catalogues routinely reuse `mask` and `drop` several times in one
/// pattern, which the regex engine rejects.
fn disambiguate_group_names(pattern: &str) -> Cow<'_, str> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut last = 0;
    let mut changed = false;

    for caps in GROUP_NAME_RE.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else { continue };
        let escaped = pattern[..whole.start()]
            .bytes()
            .rev()
            .take_while(|b| *b == b'\\')
            .count()
            % 2
            == 1;
        if escaped {
            continue;
        }

        let count = seen.entry(name.as_str()).or_insert(0);
        *count += 1;
        if *count > 1 {
            out.push_str(&pattern[last..name.end()]);
            out.push_str(&format!("{}{}", DUPLICATE_GROUP_MARKER, count));
            last = name.end();
            changed = true;
        }
    }

    if !changed {
        return Cow::Borrowed(pattern);
    }
    out.push_str(&pattern[last..]);
    Cow::Owned(out)
}

fn base_group_name(name: &str) -> &str {
    match name.find(DUPLICATE_GROUP_MARKER) {
        Some(idx) => &name[..idx],
        None => name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Echo(usize),
    Mask(usize),
    Drop,
}

/// What a `mask` group turns into.
pub enum Masker<'a> {
    /// Constant mask text.
    Static(&'a [u8]),
    /// A token from the tokenizer, keyed on the text the group matched.
    Tokenize {
        tokenizer: &'a Tokenizer,
        mask_text: &'a [u8],
        context: &'a str,
        file_path: &'a str,
    },
}

impl<'a> Masker<'a> {
    /// Picks tokenization when the tokenizer is enabled, the mask text otherwise.
    pub fn for_rule(tokenizer: &'a Tokenizer, mask_text: &'a str, context: &'a str, file_path: &'a str) -> Self {
        if tokenizer.is_enabled() {
            Masker::Tokenize {
                tokenizer,
                mask_text: mask_text.as_bytes(),
                context,
                file_path,
            }
        } else {
            Masker::Static(mask_text.as_bytes())
        }
    }

    /// Values the tokenizer declines, such as blank ones, get the rule's mask text.
    pub fn mask<'m>(&self, matched: &'m [u8]) -> Cow<'a, [u8]> {
        match self {
            Masker::Static(text) => Cow::Borrowed(*text),
            Masker::Tokenize { tokenizer, mask_text, context, file_path } => {
                match tokenizer.try_tokenize(matched, context, file_path) {
                    Some(token) => Cow::Owned(token.into_bytes()),
                    None => Cow::Borrowed(*mask_text),
                }
            }
        }
    }
}

/// A regex plus its resolved substitution steps.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Arc<Regex>,
    steps: Vec<Step>,
}

impl CompiledPattern {
    pub fn compile(rule_name: &str, pattern: &str) -> Result<Self, ScrubError> {
        let regex = compile_regex(rule_name, pattern)?;
        let steps = regex
            .capture_names()
            .enumerate()
            .skip(1) // index 0 is the entire match
            .map(|(i, name)| match name.map(base_group_name) {
                None => Step::Echo(i),
                Some("mask") => Step::Mask(i),
                Some("drop") => Step::Drop,
                Some(_) => Step::Echo(i),
            })
            .collect();
        Ok(Self { regex, steps })
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.regex.is_match(haystack)
    }

    /// Replaces every match in `haystack` with its substitution.
    pub fn substitute<'h>(&self, haystack: &'h [u8], masker: &Masker<'_>) -> Cow<'h, [u8]> {
        self.regex.replace_all(haystack, |caps: &Captures<'_>| {
            let mut out = Vec::new();
            for step in &self.steps {
                match *step {
                    Step::Echo(i) => {
                        if let Some(m) = caps.get(i) {
                            out.extend_from_slice(m.as_bytes());
                        }
                    }
                    Step::Mask(i) => {
                        let matched = caps.get(i).map(|m| m.as_bytes()).unwrap_or_default();
                        out.extend_from_slice(&masker.mask(matched));
                    }
                    Step::Drop => {}
                }
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: &[u8] = b"***HIDDEN***";

    fn apply(pattern: &str, input: &str) -> String {
        let compiled = CompiledPattern::compile("test", pattern).unwrap();
        let out = compiled.substitute(input.as_bytes(), &Masker::Static(MASK));
        String::from_utf8(out.into_owned()).unwrap()
    }

    #[test]
    fn test_group_roles() {
        assert_eq!(apply(r"(a)(?P<mask>b)(c)", "xabcx"), "xa***HIDDEN***cx");
        assert_eq!(apply(r"(a)(?P<drop>b)(c)", "xabcx"), "xacx");
        assert_eq!(apply(r"(?P<key>a)=(?P<mask>\w+)", "a=secret"), "a***HIDDEN***");
    }

    #[test]
    fn test_repeated_mask_and_drop_groups_compile() {
        let ipv4 = r"(?P<mask>\b(?P<drop>\d{1,3})\.(?P<drop>\d{1,3})\.(?P<drop>\d{1,3})\.(?P<drop>\d{1,3})\b)";
        assert_eq!(apply(ipv4, "host 10.0.0.1 up"), "host ***HIDDEN*** up");

        let conn = r"(https?)(://)(?P<mask>[^:/]+)(:)(?P<mask>[^@/]+)(?P<host>@[^:/\s]+)";
        assert_eq!(
            apply(conn, "url=http://user:pass@db"),
            "url=http://***HIDDEN***:***HIDDEN***@db"
        );
    }

    #[test]
    fn test_escaped_group_opener_is_untouched() {
        assert_eq!(disambiguate_group_names(r"\(?P<mask>x"), r"\(?P<mask>x");
        assert_eq!(
            disambiguate_group_names(r"(?P<mask>a)(?P<mask>b)"),
            "(?P<mask>a)(?P<mask__dup2>b)"
        );
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let err = CompiledPattern::compile("broken", r"(unclosed").unwrap_err();
        assert!(matches!(err, ScrubError::RuleCompilationError(name, _) if name == "broken"));
    }

    #[test]
    fn test_pattern_length_limit() {
        let long = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert!(matches!(
            compile_regex("long", &long),
            Err(ScrubError::PatternLengthExceeded(_, _, MAX_PATTERN_LENGTH))
        ));
    }

    #[test]
    fn test_binary_haystack_without_match_is_borrowed() {
        let compiled = CompiledPattern::compile("bin", r"(?P<mask>secret)").unwrap();
        let input = [0xffu8, 0x00, 0xfe, b'a'];
        let out = compiled.substitute(&input, &Masker::Static(MASK));
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &input);
    }

    fn enabled_tokenizer() -> Tokenizer {
        Tokenizer::new(crate::tokenizer::TokenizerConfig {
            enabled: true,
            salt: b"compiler-test-salt".to_vec(),
            ..Default::default()
        })
    }

    #[test]
    fn test_distinct_binary_secrets_get_distinct_tokens() {
        let tokenizer = enabled_tokenizer();
        let masker = Masker::for_rule(&tokenizer, "[gone]", "key", "dump.bin");
        let compiled = CompiledPattern::compile("bin", r"(?-u)(key=)(?P<mask>[\x80-\xff]+)").unwrap();

        let first = compiled.substitute(b"key=\xff", &masker).into_owned();
        let second = compiled.substitute(b"key=\xfe", &masker).into_owned();
        assert_ne!(first, second);
        assert_eq!(tokenizer.token_count(), 2);

        let map = tokenizer.redaction_map("test");
        let originals: Vec<Vec<u8>> = map.tokens.keys().filter_map(|t| map.original_bytes(t)).collect();
        assert!(originals.contains(&vec![0xff]));
        assert!(originals.contains(&vec![0xfe]));
    }

    #[test]
    fn test_blank_match_uses_rule_mask_text() {
        let tokenizer = enabled_tokenizer();
        let masker = Masker::for_rule(&tokenizer, "[gone]", "password", "f");
        let compiled = CompiledPattern::compile("blank", r"(pw=)(?P<mask>[ ]*)(;)").unwrap();
        let out = compiled.substitute(b"pw=  ;", &masker);
        assert_eq!(&*out, b"pw=[gone];");
        assert_eq!(tokenizer.token_count(), 0);
    }
}

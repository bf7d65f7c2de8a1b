// scrubsh-core/src/tokenizer/mod.rs
//! Deterministic tokenization of secrets.
//!
//! Instead of a constant mask, an enabled [`Tokenizer`] replaces each secret
//! with a typed pseudonym such as `***TOKEN_PASSWORD_9F2C1A***`. The hash part
//! is an HMAC-SHA256 keyed with a per-tokenizer salt, so tokens are stable
//! within one tokenizer and unlinkable across tokenizers. Values are
//! normalized first, so `"  hunter2 "` and `hunter2` share a token.
//!
//! Every token maps to exactly one normalized secret: collisions of the
//! truncated hash are resolved with a numeric suffix (`***TOKEN_KEY_ABC123_1***`).
//!
//! The tokenizer also tracks where each token was used, duplicate secrets
//! across files and per-file statistics, and can export a token map,
//! optionally encrypted (see [`map`]).
//!
//! License: MIT OR Apache-2.0

pub mod classify;
mod correlate;
pub mod map;
pub mod normalize;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tinytemplate::TinyTemplate;

use crate::errors::ScrubError;
use crate::redaction_match::log_tokenization_debug;
use classify::{classify, SecretType};
use map::{
    count_by_type, encrypt_map, fill_random, generate_map_key, write_map_file, CacheStats,
    CorrelationGroup, DuplicateGroup, FileStats, RedactionMap, RedactionStats, MAP_KEY_LEN,
};
use normalize::normalize_secret;

type HmacSha256 = Hmac<Sha256>;

/// The constant placeholder used whenever tokenization is off.
pub const MASK_TEXT: &str = "***HIDDEN***";

/// Environment switch for the shared tokenizer: `true`, `1` or `enabled`.
pub const TOKENIZATION_ENV: &str = "SCRUBSH_TOKENIZATION";

pub const DEFAULT_TOKEN_TEMPLATE: &str = "***TOKEN_{kind}_{hash}***";
pub const DEFAULT_HASH_LENGTH: usize = 6;
const MAX_HASH_LENGTH: usize = 64;
const SALT_LEN: usize = 32;
const MAX_COLLISION_ATTEMPTS: u64 = 100;

lazy_static! {
    static ref TOKEN_RE: regex::Regex =
        regex::Regex::new(r"^\*\*\*TOKEN_[A-Z]+_[A-F0-9]+(\*\*\*|_\d+\*\*\*)$").expect("token grammar is valid");

    static ref TOKENIZATION_ENABLED: bool = {
        std::env::var(TOKENIZATION_ENV)
            .map(|v| matches!(v.as_str(), "true" | "1" | "enabled"))
            .unwrap_or(false)
    };

    static ref GLOBAL_TOKENIZER: Arc<Tokenizer> = {
        let enabled = *TOKENIZATION_ENABLED;
        info!("Initializing shared tokenizer (enabled: {}).", enabled);
        Arc::new(Tokenizer::new(TokenizerConfig {
            enabled,
            ..Default::default()
        }))
    };
}

/// Structural check against `***TOKEN_<TYPE>_<HEX>***` with an optional `_<N>` suffix.
pub fn validate_token(token: &str) -> bool {
    TOKEN_RE.is_match(token)
}

#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    pub enabled: bool,
    /// HMAC key. Generated randomly when left empty.
    pub salt: Vec<u8>,
    pub default_type: SecretType,
    /// TinyTemplate text with `{kind}` and `{hash}` placeholders.
    pub token_template: String,
    pub hash_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            salt: Vec::new(),
            default_type: SecretType::Generic,
            token_template: DEFAULT_TOKEN_TEMPLATE.to_string(),
            hash_length: DEFAULT_HASH_LENGTH,
        }
    }
}

#[derive(Serialize)]
struct TokenParts<'a> {
    kind: &'a str,
    hash: &'a str,
}

fn render_token(template: &str, kind: &str, hash: &str) -> Result<String, tinytemplate::error::Error> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("token", template)?;
    tt.render("token", &TokenParts { kind, hash })
}

/// Appends a collision suffix inside the closing `***`.
fn with_suffix(base: &str, n: u64) -> String {
    match base.strip_suffix("***") {
        Some(stem) => format!("{}_{}***", stem, n),
        None => format!("{}_{}", base, n),
    }
}

/// What a secret is looked up and hashed by.
///
/// Text is normalized first. Bytes that are not UTF-8 are kept verbatim, so two
/// different binary values never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SecretKey {
    Text(String),
    Binary(Vec<u8>),
}

impl SecretKey {
    fn as_bytes(&self) -> &[u8] {
        match self {
            SecretKey::Text(text) => text.as_bytes(),
            SecretKey::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Default)]
struct TokenizerState {
    /// secret -> token
    token_map: HashMap<SecretKey, String>,
    /// token -> secret, for collision checks
    reverse_map: HashMap<String, SecretKey>,
    /// token -> original value as first seen, for the exported map
    originals: BTreeMap<String, String>,
    /// tokens whose original is hex-encoded raw bytes
    binary_tokens: BTreeSet<String>,
    token_types: HashMap<String, SecretType>,
    secret_refs: BTreeMap<String, Vec<String>>,
    duplicate_groups: BTreeMap<String, DuplicateGroup>,
    correlations: Vec<CorrelationGroup>,
    file_stats: BTreeMap<String, FileStats>,
    cache_stats: CacheStats,
    normalized_secrets: HashSet<String>,
}

impl TokenizerState {
    fn is_free(&self, token: &str, normalized: &SecretKey) -> bool {
        self.reverse_map.get(token).map_or(true, |owner| owner == normalized)
    }

    fn resolve_collision(&self, base: String, normalized: &SecretKey) -> String {
        if self.is_free(&base, normalized) {
            return base;
        }
        for n in 1..=MAX_COLLISION_ATTEMPTS {
            let candidate = with_suffix(&base, n);
            if self.is_free(&candidate, normalized) {
                return candidate;
            }
        }

        warn!("Token collisions exhausted {} suffixes; falling back to a clock-derived suffix.", MAX_COLLISION_ATTEMPTS);
        let mut n = MAX_COLLISION_ATTEMPTS + 1 + u64::from(Utc::now().timestamp_subsec_nanos() % 10_000);
        loop {
            let candidate = with_suffix(&base, n);
            if self.is_free(&candidate, normalized) {
                return candidate;
            }
            n += 1;
        }
    }

    fn track_usage(&mut self, token: &str, kind: SecretType, file_path: &str, secret_hash: String, now: DateTime<Utc>) {
        let refs = self.secret_refs.entry(token.to_string()).or_default();
        if !refs.iter().any(|f| f == file_path) {
            refs.push(file_path.to_string());
        }

        let stats = self.file_stats.entry(file_path.to_string()).or_insert_with(|| FileStats {
            file_path: file_path.to_string(),
            secrets_found: 0,
            tokens_used: 0,
            secret_types: BTreeMap::new(),
            processed_at: now,
        });
        stats.secrets_found += 1;
        stats.tokens_used += 1;
        *stats.secret_types.entry(kind.to_string()).or_default() += 1;
        stats.processed_at = now;

        match self.duplicate_groups.get_mut(&secret_hash) {
            Some(group) => {
                group.count += 1;
                group.last_seen = now;
                if !group.locations.iter().any(|l| l == file_path) {
                    group.locations.push(file_path.to_string());
                }
            }
            None => {
                self.duplicate_groups.insert(
                    secret_hash.clone(),
                    DuplicateGroup {
                        secret_hash,
                        token: token.to_string(),
                        secret_type: kind.to_string(),
                        locations: vec![file_path.to_string()],
                        count: 1,
                        first_seen: now,
                        last_seen: now,
                    },
                );
            }
        }
    }
}

/// A long-lived, thread-safe tokenization engine.
#[derive(Debug)]
pub struct Tokenizer {
    config: TokenizerConfig,
    bundle_id: String,
    state: Mutex<TokenizerState>,
}

impl Tokenizer {
    pub fn new(mut config: TokenizerConfig) -> Self {
        if config.salt.is_empty() {
            let mut salt = vec![0u8; SALT_LEN];
            match fill_random(&mut salt) {
                Ok(()) => config.salt = salt,
                Err(e) => {
                    warn!("Falling back to a time-based tokenizer salt: {}", e);
                    config.salt = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string().into_bytes();
                }
            }
        }
        if config.hash_length == 0 {
            config.hash_length = DEFAULT_HASH_LENGTH;
        }
        config.hash_length = config.hash_length.min(MAX_HASH_LENGTH);

        // Exported maps are validated against the token grammar, so the
        // template must render tokens that satisfy it.
        match render_token(&config.token_template, "GENERIC", "0") {
            Ok(sample) if validate_token(&sample) && validate_token(&with_suffix(&sample, 1)) => {}
            Ok(sample) => {
                warn!(
                    "Token template '{}' renders '{}', which does not match the token grammar; using the default.",
                    config.token_template, sample
                );
                config.token_template = DEFAULT_TOKEN_TEMPLATE.to_string();
            }
            Err(e) => {
                warn!("Invalid token template '{}' ({}); using the default.", config.token_template, e);
                config.token_template = DEFAULT_TOKEN_TEMPLATE.to_string();
            }
        }

        let mut id_bytes = [0u8; 8];
        if let Err(e) = fill_random(&mut id_bytes) {
            warn!("Bundle id will not carry random bytes: {}", e);
        }
        let bundle_id = format!(
            "bundle_{}_{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            hex::encode(id_bytes)
        );

        Self {
            config,
            bundle_id,
            state: Mutex::new(TokenizerState::default()),
        }
    }

    /// The process-wide tokenizer. Its enable flag comes from
    /// [`TOKENIZATION_ENV`], read once on first use.
    pub fn global() -> Arc<Tokenizer> {
        Arc::clone(&GLOBAL_TOKENIZER)
    }

    fn lock(&self) -> MutexGuard<'_, TokenizerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn tokenize(&self, value: &str, context: &str) -> String {
        self.tokenize_with_path(value, context, "")
    }

    /// Returns the token for `value`, or [`MASK_TEXT`] when disabled.
    ///
    /// A non-empty `file_path` records where the secret was seen.
    pub fn tokenize_with_path(&self, value: &str, context: &str, file_path: &str) -> String {
        self.try_tokenize(value.as_bytes(), context, file_path)
            .unwrap_or_else(|| MASK_TEXT.to_string())
    }

    /// Returns the token for a raw matched value.
    ///
    /// `None` means no token applies: the tokenizer is disabled or the value
    /// is blank after normalization. Callers then fall back to their own mask
    /// text. Values that are not UTF-8 are keyed on their exact bytes and
    /// exported hex-encoded.
    pub fn try_tokenize(&self, value: &[u8], context: &str, file_path: &str) -> Option<String> {
        if !self.config.enabled || value.is_empty() {
            return None;
        }
        let (normalized, original) = match std::str::from_utf8(value) {
            Ok(text) => {
                let normalized = normalize_secret(text);
                if normalized.is_empty() {
                    return None;
                }
                (SecretKey::Text(normalized), text.to_string())
            }
            Err(_) => (SecretKey::Binary(value.to_vec()), hex::encode(value)),
        };
        let is_binary = matches!(normalized, SecretKey::Binary(_));
        let readable = String::from_utf8_lossy(value);

        let now = Utc::now();
        let kind = classify(context, &readable, self.config.default_type);
        let secret_hash = self.secret_hash(&normalized);
        let mut state = self.lock();

        if let SecretKey::Text(text) = &normalized {
            if *text != original {
                state.normalized_secrets.insert(text.clone());
            }
        }
        state.cache_stats.total += 1;

        if let Some(existing) = state.token_map.get(&normalized).cloned() {
            state.cache_stats.hits += 1;
            if !file_path.is_empty() {
                state.track_usage(&existing, kind, file_path, secret_hash, now);
            }
            return Some(existing);
        }
        state.cache_stats.misses += 1;

        let base = self.base_token(&normalized, context, kind);
        let token = state.resolve_collision(base, &normalized);

        state.token_map.insert(normalized.clone(), token.clone());
        state.reverse_map.insert(token.clone(), normalized);
        state.originals.insert(token.clone(), original);
        if is_binary {
            state.binary_tokens.insert(token.clone());
        }
        state.token_types.insert(token.clone(), kind);
        if !file_path.is_empty() {
            state.track_usage(&token, kind, file_path, secret_hash, now);
        }
        drop(state);

        log_tokenization_debug(module_path!(), &readable, &token, context);
        Some(token)
    }

    fn base_token(&self, normalized: &SecretKey, context: &str, kind: SecretType) -> String {
        let hash = self.keyed_hex(&[normalized.as_bytes(), context.as_bytes()]);
        let hash = hash[..self.config.hash_length.min(hash.len())].to_uppercase();
        render_token(&self.config.token_template, kind.as_str(), &hash)
            .unwrap_or_else(|_| format!("***TOKEN_{}_{}***", kind.as_str(), hash))
    }

    /// Identifies a normalized secret in duplicate tracking without revealing it.
    fn secret_hash(&self, normalized: &SecretKey) -> String {
        let hex = self.keyed_hex(&[b"duplicate-tracking:", normalized.as_bytes()]);
        hex[..32].to_string()
    }

    fn keyed_hex(&self, parts: &[&[u8]]) -> String {
        match HmacSha256::new_from_slice(&self.config.salt) {
            Ok(mut mac) => {
                for part in parts {
                    mac.update(part);
                }
                hex::encode(mac.finalize().into_bytes())
            }
            Err(e) => {
                warn!("HMAC initialization failed ({}); hashing salt and value instead.", e);
                let mut hasher = Sha256::new();
                hasher.update(&self.config.salt);
                for part in parts {
                    hasher.update(part);
                }
                hex::encode(hasher.finalize())
            }
        }
    }

    /// Recomputes correlation groups over everything tracked so far.
    pub fn analyze(&self) -> Vec<CorrelationGroup> {
        let mut state = self.lock();
        state.correlations = correlate::analyze(&state.secret_refs, &state.token_types, Utc::now());
        state.correlations.clone()
    }

    /// Snapshot of the token map with fresh correlation analysis.
    pub fn redaction_map(&self, profile: &str) -> RedactionMap {
        let mut state = self.lock();
        state.correlations = correlate::analyze(&state.secret_refs, &state.token_types, Utc::now());

        let stats = RedactionStats {
            total_secrets: state.originals.len(),
            unique_secrets: state.token_map.len(),
            tokens_generated: state.reverse_map.len(),
            secrets_by_type: count_by_type(state.originals.keys()),
            processing_time_ms: 0,
            files_covered: state.file_stats.len(),
            duplicate_count: state.duplicate_groups.values().filter(|g| g.count > 1).count(),
            correlation_count: state.correlations.len(),
            normalization_hits: state.normalized_secrets.len(),
            cache_hits: state.cache_stats.hits,
            cache_misses: state.cache_stats.misses,
            file_coverage: state.file_stats.clone(),
        };

        RedactionMap {
            tokens: state.originals.clone(),
            stats,
            timestamp: Utc::now(),
            profile: profile.to_string(),
            bundle_id: self.bundle_id.clone(),
            secret_refs: state.secret_refs.clone(),
            duplicates: state.duplicate_groups.values().cloned().collect(),
            correlations: state.correlations.clone(),
            binary_tokens: state.binary_tokens.clone(),
            is_encrypted: false,
        }
    }

    /// Writes the token map to `path` with owner-only permissions.
    ///
    /// With `encrypt`, every value is sealed under a freshly generated key which
    /// is returned to the caller and nowhere else.
    pub fn export(&self, profile: &str, path: &Path, encrypt: bool) -> Result<Option<[u8; MAP_KEY_LEN]>, ScrubError> {
        let map = self.redaction_map(profile);
        let (map, key) = if encrypt {
            let key = generate_map_key()?;
            (encrypt_map(&map, &key)?, Some(key))
        } else {
            (map, None)
        };
        write_map_file(&map, path)?;
        info!(
            "Exported {} tokens to {} (encrypted: {}).",
            map.tokens.len(),
            path.display(),
            map.is_encrypted
        );
        Ok(key)
    }

    pub fn token_count(&self) -> usize {
        self.lock().token_map.len()
    }

    /// Groups for secrets seen more than once.
    pub fn duplicate_groups(&self) -> Vec<DuplicateGroup> {
        self.lock()
            .duplicate_groups
            .values()
            .filter(|g| g.count > 1)
            .cloned()
            .collect()
    }

    pub fn file_stats(&self, file_path: &str) -> Option<FileStats> {
        self.lock().file_stats.get(file_path).cloned()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().cache_stats
    }

    /// Forgets every token and statistic. Salt and bundle id are kept.
    pub fn reset(&self) {
        debug!("Resetting tokenizer state.");
        *self.lock() = TokenizerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> Tokenizer {
        Tokenizer::new(TokenizerConfig {
            enabled: true,
            salt: b"unit-test-salt".to_vec(),
            ..Default::default()
        })
    }

    #[test]
    fn test_disabled_returns_mask() {
        let t = Tokenizer::new(TokenizerConfig::default());
        assert_eq!(t.tokenize("hunter2", "password"), MASK_TEXT);
        assert_eq!(t.token_count(), 0);
    }

    #[test]
    fn test_empty_value_returns_mask() {
        let t = enabled();
        assert_eq!(t.tokenize("", "password"), MASK_TEXT);
        assert_eq!(t.tokenize("   ", "password"), MASK_TEXT);
    }

    #[test]
    fn test_token_shape() {
        let t = enabled();
        let token = t.tokenize("mypassword", "password");
        assert!(token.starts_with("***TOKEN_PASSWORD_"), "{}", token);
        assert!(validate_token(&token), "{}", token);
        assert_eq!(token.len(), "***TOKEN_PASSWORD_".len() + DEFAULT_HASH_LENGTH + 3);
    }

    #[test]
    fn test_same_salt_same_token_across_instances() {
        assert_eq!(enabled().tokenize("abc", "api_key"), enabled().tokenize("abc", "api_key"));
    }

    #[test]
    fn test_random_salt_unlinks_instances() {
        // A long hash keeps an accidental match out of the picture.
        let config = TokenizerConfig {
            enabled: true,
            hash_length: 32,
            ..Default::default()
        };
        let a = Tokenizer::new(config.clone());
        let b = Tokenizer::new(config);
        let value = "correct-horse-battery-staple";
        assert_ne!(a.tokenize(value, "secret"), b.tokenize(value, "secret"));
    }

    #[test]
    fn test_collision_suffix_keeps_grammar() {
        assert_eq!(with_suffix("***TOKEN_KEY_AB***", 3), "***TOKEN_KEY_AB_3***");
        assert!(validate_token(&with_suffix("***TOKEN_KEY_AB***", 12)));
    }

    #[test]
    fn test_validate_token_grammar() {
        assert!(validate_token("***TOKEN_PASSWORD_A1B2C3***"));
        assert!(validate_token("***TOKEN_APIKEY_FF_2***"));
        assert!(!validate_token("***TOKEN_password_A1B2C3***"));
        assert!(!validate_token("***TOKEN_PASSWORD_XYZ***"));
        assert!(!validate_token("***TOKEN_PASSWORD_A1B2C3***_1"));
        assert!(!validate_token("***HIDDEN***"));
    }

    #[test]
    fn test_templates_outside_the_grammar_fall_back() {
        for template in ["<{kind}:{hash}>", "{unclosed", "***TOKEN_{kind}***", "TOKEN_{kind}_{hash}"] {
            let t = Tokenizer::new(TokenizerConfig {
                enabled: true,
                token_template: template.to_string(),
                ..Default::default()
            });
            assert_eq!(t.config().token_template, DEFAULT_TOKEN_TEMPLATE, "{}", template);
            assert!(validate_token(&t.tokenize("value-1", "password")));
        }
    }

    #[test]
    fn test_conforming_template_is_kept() {
        let template = "***TOKEN_{kind}_{hash}***".to_string();
        let t = Tokenizer::new(TokenizerConfig {
            enabled: true,
            token_template: template.clone(),
            hash_length: 10,
            ..Default::default()
        });
        assert_eq!(t.config().token_template, template);
        let token = t.tokenize("value-1", "password");
        assert_eq!(token.len(), "***TOKEN_PASSWORD_".len() + 10 + 3);
    }

    #[test]
    fn test_blank_value_yields_no_token() {
        let t = enabled();
        assert_eq!(t.try_tokenize(b"", "password", "f"), None);
        assert_eq!(t.try_tokenize(b"  \t", "password", "f"), None);
        assert_eq!(t.token_count(), 0);
        assert!(t.file_stats("f").is_none());
    }

    #[test]
    fn test_invalid_utf8_values_stay_distinct() {
        let t = enabled();
        let a = t.try_tokenize(b"\xff", "key", "f").unwrap();
        let b = t.try_tokenize(b"\xfe", "key", "f").unwrap();
        assert_ne!(a, b);
        assert_eq!(t.try_tokenize(b"\xff", "key", "f"), Some(a.clone()));
        assert_eq!(t.token_count(), 2);

        let map = t.redaction_map("test");
        assert_eq!(map.tokens[&a], "ff");
        assert_eq!(map.tokens[&b], "fe");
        assert_eq!(map.original_bytes(&a), Some(vec![0xff]));
        assert!(map.binary_tokens.contains(&b));
    }

    #[test]
    fn test_reset_keeps_bundle_id() {
        let t = enabled();
        let id = t.bundle_id().to_string();
        t.tokenize_with_path("x1234567", "secret", "a.txt");
        t.reset();
        assert_eq!(t.token_count(), 0);
        assert!(t.file_stats("a.txt").is_none());
        assert_eq!(t.bundle_id(), id);
    }
}

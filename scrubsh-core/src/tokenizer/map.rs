// scrubsh-core/src/tokenizer/map.rs
//! The persisted token map: its JSON shape, value encryption, loading and
//! structural validation.
//!
//! Encryption is per value: every entry in `tokens` is sealed independently
//! with AES-256-GCM under a fresh random nonce. The stored form is
//! `hex(nonce || ciphertext)`. The key is never part of the artifact.
//!
//! License: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use chrono::{DateTime, Utc};
use log::debug;
use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::{Deserialize, Serialize};

use crate::errors::ScrubError;
use crate::tokenizer::validate_token;

const AES_NONCE_LEN: usize = 12;
pub const MAP_KEY_LEN: usize = 32;

/// Counts describing one tokenizer's work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionStats {
    pub total_secrets: usize,
    pub unique_secrets: usize,
    pub tokens_generated: usize,
    pub secrets_by_type: BTreeMap<String, usize>,
    pub processing_time_ms: i64,
    pub files_covered: usize,
    pub duplicate_count: usize,
    pub correlation_count: usize,
    pub normalization_hits: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub file_coverage: BTreeMap<String, FileStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub file_path: String,
    pub secrets_found: usize,
    pub tokens_used: usize,
    pub secret_types: BTreeMap<String, usize>,
    pub processed_at: DateTime<Utc>,
}

/// One distinct normalized secret and everywhere it was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub secret_hash: String,
    pub token: String,
    pub secret_type: String,
    pub locations: Vec<String>,
    pub count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Tokens that likely belong to one logical credential set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationGroup {
    pub pattern: String,
    pub description: String,
    pub tokens: Vec<String>,
    pub files: Vec<String>,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
}

/// Snapshot of a tokenizer: token to original value (or ciphertext), plus analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionMap {
    pub tokens: BTreeMap<String, String>,
    pub stats: RedactionStats,
    pub timestamp: DateTime<Utc>,
    pub profile: String,
    pub bundle_id: String,
    #[serde(default)]
    pub secret_refs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub duplicates: Vec<DuplicateGroup>,
    #[serde(default)]
    pub correlations: Vec<CorrelationGroup>,
    /// Tokens whose value is the hex encoding of bytes that were not UTF-8.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub binary_tokens: BTreeSet<String>,
    #[serde(default)]
    pub is_encrypted: bool,
}

impl RedactionMap {
    /// The exact bytes a token stands for. `None` for unknown tokens, for
    /// encrypted maps and for malformed binary entries.
    pub fn original_bytes(&self, token: &str) -> Option<Vec<u8>> {
        if self.is_encrypted {
            return None;
        }
        let value = self.tokens.get(token)?;
        if self.binary_tokens.contains(token) {
            hex::decode(value).ok()
        } else {
            Some(value.clone().into_bytes())
        }
    }
}

/// Fills `buf` from the operating system's CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), ScrubError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| ScrubError::EncryptionError(format!("failed to gather randomness: {}", e)))
}

/// Generates a fresh 32-byte key for [`encrypt_map`].
pub fn generate_map_key() -> Result<[u8; MAP_KEY_LEN], ScrubError> {
    let mut key = [0u8; MAP_KEY_LEN];
    fill_random(&mut key)?;
    Ok(key)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, ScrubError> {
    if key.len() != MAP_KEY_LEN {
        return Err(ScrubError::InvalidKeyLength(key.len()));
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| ScrubError::InvalidKeyLength(key.len()))
}

/// Returns a copy of `map` whose token values are sealed under `key`.
///
/// An already encrypted map is returned unchanged.
pub fn encrypt_map(map: &RedactionMap, key: &[u8]) -> Result<RedactionMap, ScrubError> {
    let cipher = cipher_for(key)?;
    if map.is_encrypted {
        return Ok(map.clone());
    }

    let mut tokens = BTreeMap::new();
    for (token, original) in &map.tokens {
        let mut nonce_bytes = [0u8; AES_NONCE_LEN];
        fill_random(&mut nonce_bytes)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), original.as_bytes())
            .map_err(|e| ScrubError::EncryptionError(format!("AES-GCM encryption failed: {:?}", e)))?;

        let mut sealed = Vec::with_capacity(AES_NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        tokens.insert(token.clone(), hex::encode(sealed));
    }

    Ok(RedactionMap {
        tokens,
        is_encrypted: true,
        ..map.clone()
    })
}

/// Reverses [`encrypt_map`]. Any entry that fails authentication fails the whole call.
pub fn decrypt_map(map: &RedactionMap, key: &[u8]) -> Result<RedactionMap, ScrubError> {
    let cipher = cipher_for(key)?;
    if !map.is_encrypted {
        return Ok(map.clone());
    }

    let mut tokens = BTreeMap::new();
    for (token, sealed_hex) in &map.tokens {
        let sealed = hex::decode(sealed_hex)
            .map_err(|e| ScrubError::DecryptionError(token.clone(), format!("invalid hex: {}", e)))?;
        if sealed.len() < AES_NONCE_LEN {
            return Err(ScrubError::DecryptionError(token.clone(), "ciphertext shorter than nonce".to_string()));
        }
        let (nonce, ciphertext) = sealed.split_at(AES_NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ScrubError::DecryptionError(token.clone(), "authentication failed".to_string()))?;
        let value = String::from_utf8(plaintext)
            .map_err(|_| ScrubError::DecryptionError(token.clone(), "plaintext is not UTF-8".to_string()))?;
        tokens.insert(token.clone(), value);
    }

    Ok(RedactionMap {
        tokens,
        is_encrypted: false,
        ..map.clone()
    })
}

/// Writes `map` as pretty JSON, readable and writable by the owner only.
pub fn write_map_file(map: &RedactionMap, path: &Path) -> Result<(), ScrubError> {
    let json = serde_json::to_vec_pretty(map)?;

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        // `mode` only applies on creation; tighten a pre-existing file too.
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(&json)?;
    file.flush()?;

    debug!("Wrote redaction map with {} tokens to {}", map.tokens.len(), path.display());
    Ok(())
}

/// Reads a map file. Encrypted values are decrypted only when `key` is given.
pub fn load_map(path: &Path, key: Option<&[u8]>) -> Result<RedactionMap, ScrubError> {
    let raw = fs::read(path)?;
    let map: RedactionMap = serde_json::from_slice(&raw)?;
    match key {
        Some(key) if map.is_encrypted => decrypt_map(&map, key),
        _ => Ok(map),
    }
}

/// Structural checks that never need the key.
pub fn validate_map(map: &RedactionMap) -> Result<(), ScrubError> {
    if map.bundle_id.is_empty() {
        return Err(ScrubError::InvalidRedactionMap("missing bundle ID".to_string()));
    }
    if map.stats.total_secrets != map.tokens.len() {
        return Err(ScrubError::InvalidRedactionMap(format!(
            "stats mismatch (expected {} secrets, found {})",
            map.stats.total_secrets,
            map.tokens.len()
        )));
    }
    if let Some(bad) = map.tokens.keys().find(|t| !validate_token(t)) {
        return Err(ScrubError::InvalidRedactionMap(format!("invalid token format: {}", bad)));
    }
    Ok(())
}

pub fn validate_map_file(path: &Path) -> Result<(), ScrubError> {
    validate_map(&load_map(path, None)?)
}

/// Number of tokens per type segment, for stats.
pub(crate) fn count_by_type<'a>(tokens: impl Iterator<Item = &'a String>) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for token in tokens {
        if let Some(kind) = token
            .strip_prefix("***TOKEN_")
            .and_then(|rest| rest.split('_').next())
        {
            *counts.entry(kind.to_string()).or_default() += 1;
        }
    }
    counts
}

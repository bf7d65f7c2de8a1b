//! Correlation analysis: finds tokens of related types that appear in the
//! same file, which usually means they are parts of one credential set.
//!
//! Recomputed on demand from the tokenizer's file references.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use super::classify::SecretType;
use super::map::CorrelationGroup;

struct CorrelationRule {
    pattern: &'static str,
    description: &'static str,
    members: &'static [SecretType],
    confidence: f64,
}

const RULES: [CorrelationRule; 3] = [
    CorrelationRule {
        pattern: "database_credentials",
        description: "Database connection credentials found together",
        members: &[SecretType::Database, SecretType::Password],
        confidence: 0.8,
    },
    CorrelationRule {
        pattern: "key_secret_pair",
        description: "Access key and secret found together",
        members: &[SecretType::ApiKey, SecretType::Secret],
        confidence: 0.9,
    },
    CorrelationRule {
        pattern: "api_authentication",
        description: "API key and authentication token found together",
        members: &[SecretType::ApiKey, SecretType::Token],
        confidence: 0.7,
    },
];

/// A rule fires when at least one file holds two or more of its member tokens.
pub(crate) fn analyze(
    secret_refs: &BTreeMap<String, Vec<String>>,
    token_types: &HashMap<String, SecretType>,
    now: DateTime<Utc>,
) -> Vec<CorrelationGroup> {
    let mut groups = Vec::new();

    for rule in &RULES {
        let mut tokens_by_file: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (token, files) in secret_refs {
            let is_member = token_types
                .get(token)
                .map_or(false, |t| rule.members.contains(t));
            if !is_member {
                continue;
            }
            for file in files {
                tokens_by_file.entry(file.as_str()).or_default().insert(token.as_str());
            }
        }

        let shared: Vec<(&str, BTreeSet<&str>)> = tokens_by_file
            .into_iter()
            .filter(|(_, tokens)| tokens.len() >= 2)
            .collect();
        if shared.is_empty() {
            continue;
        }

        let tokens: BTreeSet<&str> = shared.iter().flat_map(|(_, t)| t.iter().copied()).collect();
        groups.push(CorrelationGroup {
            pattern: rule.pattern.to_string(),
            description: rule.description.to_string(),
            tokens: tokens.into_iter().map(str::to_string).collect(),
            files: shared.iter().map(|(f, _)| f.to_string()).collect(),
            confidence: rule.confidence,
            detected_at: now,
        });
    }

    groups
}

//! Configuration management for `scrubsh-core`.
//!
//! This module defines the rule file schema, loads user and built-in rule
//! sets, merges them, validates them, and turns the rules that apply to a
//! given file into an ordered list of redactors.
//!
//! ```yaml
//! redactors:
//!   - name: vault token
//!     fileSelector: { files: ["*/vault/*.log"] }
//!     removals:
//!       values: ["s.abcdef123456"]
//!       regex:
//!         - { scan: "token", redactor: '(token=)(?P<mask>\S+)' }
//!       yamlPath: ["auth.*.token"]
//! ```
//!
//! License: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glob::{MatchOptions, Pattern};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::engine::{Redactor, RedactorContext, RuleInfo};
use crate::engines::literal::LiteralRedactor;
use crate::engines::multi_line::MultiLineRedactor;
use crate::engines::single_line::{LineRedactor, SingleLineRedactor};
use crate::engines::yaml::{parse_path, YamlRedactor};
use crate::sanitizers::compiler::compile_regex;

/// Glob matching the way shells match paths: `*` stops at `/`.
const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Which files a rule applies to. Empty means every file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileSelector {
    pub file: Option<String>,
    pub files: Vec<String>,
}

impl FileSelector {
    pub fn is_empty(&self) -> bool {
        self.file.as_deref().map_or(true, str::is_empty) && self.files.is_empty()
    }

    fn globs(&self) -> impl Iterator<Item = &str> {
        self.file
            .as_deref()
            .filter(|f| !f.is_empty())
            .into_iter()
            .chain(self.files.iter().map(String::as_str))
    }
}

/// A regex removal. With a `selector` it pairs lines; without one it works on
/// single lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegexRemoval {
    pub selector: Option<String>,
    pub scan: Option<String>,
    pub redactor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Removals {
    pub values: Vec<String>,
    pub regex: Vec<RegexRemoval>,
    pub yaml_path: Vec<String>,
}

/// One named rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactSpec {
    pub name: String,
    pub file_selector: FileSelector,
    pub removals: Removals,
    /// Set for rules from the built-in catalogue.
    #[serde(skip)]
    pub is_builtin: bool,
}

impl RedactSpec {
    /// Whether this rule applies to `path`. An unparseable glob is an error.
    pub fn matches_path(&self, path: &str) -> Result<bool> {
        if self.file_selector.is_empty() {
            return Ok(true);
        }
        for glob in self.file_selector.globs() {
            let pattern = Pattern::new(glob)
                .with_context(|| format!("Rule '{}': invalid file match string {:?}", self.name, glob))?;
            if pattern.matches_with(path, PATH_MATCH) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn rule_info(&self) -> RuleInfo {
        RuleInfo::new(self.name.clone()).builtin(self.is_builtin)
    }

    /// Builds this rule's redactors: regex first, then literals, then YAML paths.
    pub fn build(&self, ctx: &RedactorContext) -> Result<Vec<Box<dyn Redactor>>> {
        let mut redactors: Vec<Box<dyn Redactor>> = Vec::new();

        for re in &self.removals.regex {
            let mut value = LineRedactor::new(re.redactor.clone());
            if let Some(scan) = &re.scan {
                value = value.with_scan(scan.clone());
            }
            match re.selector.as_deref().filter(|s| !s.is_empty()) {
                Some(selector) => {
                    let selector = LineRedactor {
                        regex: selector.to_string(),
                        scan: value.scan.take(),
                    };
                    redactors.push(Box::new(MultiLineRedactor::new(
                        &selector,
                        &value.regex,
                        self.rule_info(),
                        ctx.clone(),
                    )?));
                }
                None => {
                    redactors.push(Box::new(SingleLineRedactor::new(&value, self.rule_info(), ctx.clone())?));
                }
            }
        }

        for literal in &self.removals.values {
            redactors.push(Box::new(LiteralRedactor::new(literal, self.rule_info(), ctx.clone())?));
        }

        for yaml_path in &self.removals.yaml_path {
            redactors.push(Box::new(YamlRedactor::new(yaml_path, self.rule_info(), ctx.clone())?));
        }

        Ok(redactors)
    }
}

/// The top-level rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub redactors: Vec<RedactSpec>,
}

impl RedactionConfig {
    /// Parses and validates rules from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: RedactionConfig = serde_yml::from_str(text).context("Failed to parse redaction rules")?;
        validate_specs(&config.redactors)?;
        Ok(config)
    }

    /// Loads redaction rules from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading custom rules from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: RedactionConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_specs(&config.redactors)
            .with_context(|| format!("Invalid rules in {}", path.display()))?;
        info!("Loaded {} rules from file {}.", config.redactors.len(), path.display());

        Ok(config)
    }

    /// Loads the built-in rules, marked as such.
    pub fn load_default_rules() -> Result<Self> {
        debug!("Loading default rules from embedded string...");
        let default_yaml = include_str!("../config/default_rules.yaml");
        let mut config: RedactionConfig =
            serde_yml::from_str(default_yaml).context("Failed to parse default rules")?;
        for spec in &mut config.redactors {
            spec.is_builtin = true;
        }

        debug!("Loaded {} default rules.", config.redactors.len());
        Ok(config)
    }
}

/// Merges user rules over defaults. A user rule replaces the default rule of
/// the same name in place; other user rules are appended in their file order.
pub fn merge_configs(default_config: RedactionConfig, user_config: Option<RedactionConfig>) -> RedactionConfig {
    debug!("merge_configs called. Initial default rules count: {}", default_config.redactors.len());

    let Some(user_cfg) = user_config else {
        return default_config;
    };

    let mut merged = default_config.redactors;
    let positions: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, spec)| (spec.name.clone(), i))
        .collect();

    for user_spec in user_cfg.redactors {
        match positions.get(&user_spec.name) {
            Some(&i) => {
                debug!("User rule '{}' overrides the built-in rule.", user_spec.name);
                merged[i] = user_spec;
            }
            None => merged.push(user_spec),
        }
    }

    debug!("Final total rules after merge: {}", merged.len());
    RedactionConfig { redactors: merged }
}

/// Builds, in rule order, every redactor that applies to `path`.
pub fn build_redactors(config: &RedactionConfig, path: &str, ctx: &RedactorContext) -> Result<Vec<Box<dyn Redactor>>> {
    let mut redactors = Vec::new();
    for spec in &config.redactors {
        if !spec.matches_path(path)? {
            continue;
        }
        redactors.extend(
            spec.build(ctx)
                .with_context(|| format!("Failed to build redactors for rule '{}'", spec.name))?,
        );
    }
    debug!("{} redactors apply to {}", redactors.len(), path);
    Ok(redactors)
}

/// Validates rule integrity, reporting every problem at once.
fn validate_specs(specs: &[RedactSpec]) -> Result<()> {
    let mut names = HashSet::new();
    let mut errors = Vec::new();

    for spec in specs {
        if spec.name.is_empty() {
            errors.push("A rule has an empty `name` field.".to_string());
        } else if !names.insert(spec.name.as_str()) {
            errors.push(format!("Duplicate rule name found: '{}'.", spec.name));
        }

        for glob in spec.file_selector.globs() {
            if let Err(e) = Pattern::new(glob) {
                errors.push(format!("Rule '{}': invalid file match string {:?}: {}", spec.name, glob, e));
            }
        }

        for re in &spec.removals.regex {
            let patterns = [Some(&re.redactor), re.selector.as_ref(), re.scan.as_ref()];
            if re.redactor.is_empty() {
                errors.push(format!("Rule '{}' has a regex removal with an empty `redactor`.", spec.name));
            }
            for pattern in patterns.into_iter().flatten().filter(|p| !p.is_empty()) {
                if let Err(e) = compile_regex(&spec.name, pattern) {
                    errors.push(e.to_string());
                }
            }
        }

        if spec.removals.values.iter().any(String::is_empty) {
            errors.push(format!("Rule '{}' has an empty literal in `values`.", spec.name));
        }

        for yaml_path in &spec.removals.yaml_path {
            if let Err(e) = parse_path(yaml_path) {
                errors.push(format!("Rule '{}': {}", spec.name, e));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Rule validation failed:\n{}", errors.join("\n")))
    }
}

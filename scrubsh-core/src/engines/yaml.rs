// scrubsh-core/src/engines/yaml.rs
//! Path-addressed redaction inside YAML documents.
//!
//! A path such as `spec.containers.*.env.0.value` is split on `.`; `*` fans
//! out over every item of a sequence or mapping, a number indexes a sequence,
//! anything else names a mapping key. The value at the end of the path is
//! replaced. Input that does not parse as YAML, or in which the path matches
//! nothing, is passed through without being re-serialized.

use std::io;

use log::{debug, warn};
use serde_yml::{Mapping, Value};
use tokio::io::AsyncReadExt;

use crate::engine::{Redactor, RedactorContext, RuleInfo};
use crate::errors::ScrubError;
use crate::stream::{spawn_producer, ByteStream, StreamWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Wildcard,
    Key(String),
}

pub(crate) fn parse_path(path: &str) -> Result<Vec<Segment>, ScrubError> {
    if path.trim().is_empty() {
        return Err(ScrubError::InvalidYamlPath(path.to_string(), "path is empty".to_string()));
    }
    path.split('.')
        .map(|segment| match segment {
            "" => Err(ScrubError::InvalidYamlPath(
                path.to_string(),
                "path contains an empty segment".to_string(),
            )),
            "*" => Ok(Segment::Wildcard),
            key => Ok(Segment::Key(key.to_string())),
        })
        .collect()
}

fn key_matches(key: &Value, segment: &str) -> bool {
    match key {
        Value::String(s) => s == segment,
        Value::Number(n) => n.to_string() == segment,
        Value::Bool(b) => b.to_string() == segment,
        _ => false,
    }
}

/// Rewrites the values at the end of `path`, returning the new tree and
/// whether anything was replaced.
fn walk(value: Value, path: &[Segment], replace: &mut dyn FnMut(Value) -> Value) -> (Value, bool) {
    let Some((segment, rest)) = path.split_first() else {
        return (replace(value), true);
    };

    match (value, segment) {
        (Value::Sequence(items), Segment::Wildcard) => {
            let mut found = false;
            let items = items
                .into_iter()
                .map(|item| {
                    let (item, hit) = walk(item, rest, &mut *replace);
                    found |= hit;
                    item
                })
                .collect();
            (Value::Sequence(items), found)
        }
        (Value::Mapping(map), Segment::Wildcard) => {
            let mut found = false;
            let map: Mapping = map
                .into_iter()
                .map(|(k, v)| {
                    let (v, hit) = walk(v, rest, &mut *replace);
                    found |= hit;
                    (k, v)
                })
                .collect();
            (Value::Mapping(map), found)
        }
        (Value::Sequence(mut items), Segment::Key(key)) => {
            let Some(index) = key.parse::<usize>().ok().filter(|i| *i < items.len()) else {
                return (Value::Sequence(items), false);
            };
            let item = std::mem::replace(&mut items[index], Value::Null);
            let (item, found) = walk(item, rest, &mut *replace);
            items[index] = item;
            (Value::Sequence(items), found)
        }
        (Value::Mapping(map), Segment::Key(key)) => {
            let mut found = false;
            let mut done = false;
            let map: Mapping = map
                .into_iter()
                .map(|(k, v)| {
                    if done || !key_matches(&k, key) {
                        return (k, v);
                    }
                    done = true;
                    let (v, hit) = walk(v, rest, &mut *replace);
                    found = hit;
                    (k, v)
                })
                .collect();
            (Value::Mapping(map), found)
        }
        (other, _) => (other, false),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct YamlRedactor {
    path: Vec<Segment>,
    raw_path: String,
    rule: RuleInfo,
    ctx: RedactorContext,
}

impl YamlRedactor {
    pub fn new(yaml_path: &str, rule: RuleInfo, ctx: RedactorContext) -> Result<Self, ScrubError> {
        Ok(Self {
            path: parse_path(yaml_path)?,
            raw_path: yaml_path.to_string(),
            rule,
            ctx,
        })
    }

    fn mask(&self, value: Value, file_path: &str) -> Value {
        let replacement = scalar_text(&value)
            .and_then(|text| {
                self.ctx
                    .tokenizer
                    .try_tokenize(text.as_bytes(), &self.rule.name, file_path)
            })
            .unwrap_or_else(|| self.rule.mask_text.clone());
        Value::String(replacement)
    }

    /// Returns the rewritten document, or `None` to pass the input through.
    fn rewrite(&self, original: &[u8], file_path: &str) -> Option<Vec<u8>> {
        let doc: Value = match serde_yml::from_slice(original) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("'{}' is not YAML ({}); passing it through unchanged.", file_path, e);
                return None;
            }
        };

        let (doc, found) = walk(doc, &self.path, &mut |value| self.mask(value, file_path));
        if !found {
            return None;
        }
        debug!("Path '{}' matched in '{}'.", self.raw_path, file_path);
        match serde_yml::to_string(&doc) {
            Ok(text) => Some(text.into_bytes()),
            Err(e) => {
                warn!("Could not re-serialize '{}' after redacting '{}': {}", file_path, self.raw_path, e);
                None
            }
        }
    }

    async fn run(self, mut input: ByteStream, path: String, out: StreamWriter) -> io::Result<()> {
        let mut original = Vec::new();
        input.read_to_end(&mut original).await?;

        match self.rewrite(&original, &path) {
            Some(redacted) => {
                self.rule.record(&self.ctx, original.len(), redacted.len(), 0, &path);
                out.write(redacted).await
            }
            None => out.write(original).await,
        }
    }
}

impl Redactor for YamlRedactor {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn redact(&self, input: ByteStream, path: &str) -> ByteStream {
        let this = self.clone();
        let path = path.to_string();
        spawn_producer(move |out| this.run(input, path, out))
    }
}

// scrubsh-core/src/engines/single_line.rs
//! Regex redaction applied to one line at a time.
//!
//! An optional scan pattern is tried first against the ASCII-lowercased line.
//! It only exists to reject lines cheaply, so it must match at least every line
//! the value pattern would change.

use std::io;
use std::sync::Arc;

use regex::bytes::Regex;
use tokio::io::BufReader;

use crate::engine::{Redactor, RedactorContext, RuleInfo};
use crate::errors::ScrubError;
use crate::line_reader::LineReader;
use crate::sanitizers::compiler::{compile_regex, CompiledPattern, Masker};
use crate::stream::{spawn_producer, ByteStream, StreamWriter};

/// A value pattern with an optional lowercase pre-filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineRedactor {
    pub regex: String,
    pub scan: Option<String>,
}

impl LineRedactor {
    pub fn new(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            scan: None,
        }
    }

    pub fn with_scan(mut self, scan: impl Into<String>) -> Self {
        self.scan = Some(scan.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub(crate) fn compile_scan(&self, rule_name: &str) -> Result<Option<Arc<Regex>>, ScrubError> {
        self.scan.as_deref().map(|s| compile_regex(rule_name, s)).transpose()
    }
}

/// Lowercases ASCII only, so non-UTF-8 bytes are left as they are.
pub(crate) fn scan_rejects(scan: &Option<Arc<Regex>>, line: &[u8]) -> bool {
    scan.as_ref().map_or(false, |re| !re.is_match(&line.to_ascii_lowercase()))
}

#[derive(Debug, Clone)]
pub struct SingleLineRedactor {
    scan: Option<Arc<Regex>>,
    pattern: CompiledPattern,
    rule: RuleInfo,
    ctx: RedactorContext,
}

impl SingleLineRedactor {
    pub fn new(spec: &LineRedactor, rule: RuleInfo, ctx: RedactorContext) -> Result<Self, ScrubError> {
        Ok(Self {
            scan: spec.compile_scan(&rule.name)?,
            pattern: CompiledPattern::compile(&rule.name, &spec.regex)?,
            rule,
            ctx,
        })
    }

    async fn run(self, input: ByteStream, path: String, out: StreamWriter) -> io::Result<()> {
        let masker = Masker::for_rule(&self.ctx.tokenizer, &self.rule.mask_text, &self.rule.name, &path);
        let mut lines = LineReader::new(BufReader::new(input));
        let mut line_num = 0;

        while let Some((line, had_newline)) = lines.next_line().await? {
            line_num += 1;
            if scan_rejects(&self.scan, &line) || !self.pattern.is_match(&line) {
                out.write_line(&line, had_newline).await?;
                continue;
            }

            let clean = self.pattern.substitute(&line, &masker).into_owned();
            if clean != line {
                self.rule.record(&self.ctx, line.len(), clean.len(), line_num, &path);
            }
            out.write_line(&clean, had_newline).await?;
        }
        Ok(())
    }
}

impl Redactor for SingleLineRedactor {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn redact(&self, input: ByteStream, path: &str) -> ByteStream {
        let this = self.clone();
        let path = path.to_string();
        spawn_producer(move |out| this.run(input, path, out))
    }
}

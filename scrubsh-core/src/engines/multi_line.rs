// scrubsh-core/src/engines/multi_line.rs
//! Redaction of a value line selected by the line before it.
//!
//! Configuration files often split a secret across two lines, as in
//!
//! ```text
//! "name": "PASSWORD"
//! "value": "hunter2"
//! ```
//!
//! where the second line is only sensitive because of the first. The redactor
//! slides a two-line window over the input. When the first line matches the
//! selector, the second line is rewritten and the window moves past both;
//! otherwise the first line is written unchanged and the window moves by one.
//!
//! Lines are never added, dropped, reordered or given a newline they did not
//! have. Ledger entries carry the 1-based source line of the rewritten value line.

use std::io;
use std::sync::Arc;

use regex::bytes::Regex;
use tokio::io::BufReader;

use crate::engine::{Redactor, RedactorContext, RuleInfo};
use crate::engines::single_line::{scan_rejects, LineRedactor};
use crate::errors::ScrubError;
use crate::line_reader::LineReader;
use crate::sanitizers::compiler::{compile_regex, CompiledPattern, Masker};
use crate::stream::{spawn_producer, ByteStream, StreamWriter};

#[derive(Debug, Clone)]
pub struct MultiLineRedactor {
    scan: Option<Arc<Regex>>,
    selector: Arc<Regex>,
    value: CompiledPattern,
    rule: RuleInfo,
    ctx: RedactorContext,
}

type Line = (Vec<u8>, bool);

impl MultiLineRedactor {
    /// `selector` (with its optional scan) is matched against the first line of
    /// a pair, `value` rewrites the second.
    pub fn new(selector: &LineRedactor, value: &str, rule: RuleInfo, ctx: RedactorContext) -> Result<Self, ScrubError> {
        Ok(Self {
            scan: selector.compile_scan(&rule.name)?,
            selector: compile_regex(&rule.name, &selector.regex)?,
            value: CompiledPattern::compile(&rule.name, value)?,
            rule,
            ctx,
        })
    }

    fn selects(&self, line: &[u8]) -> bool {
        !scan_rejects(&self.scan, line) && self.selector.is_match(line)
    }

    async fn run(self, input: ByteStream, path: String, out: StreamWriter) -> io::Result<()> {
        let mut lines = LineReader::new(BufReader::new(input));
        // Source line number of the current first line.
        let mut line_num = 1;

        let Some(mut first) = lines.next_line().await? else {
            return Ok(());
        };

        loop {
            let Some(second) = lines.next_line().await? else {
                out.write_line(&first.0, first.1).await?;
                return Ok(());
            };

            if !self.selects(&first.0) {
                out.write_line(&first.0, first.1).await?;
                first = second;
                line_num += 1;
                continue;
            }

            self.write_pair(&out, first, second, line_num + 1, &path).await?;
            first = match lines.next_line().await? {
                Some(next) => next,
                None => return Ok(()),
            };
            line_num += 2;
        }
    }

    async fn write_pair(&self, out: &StreamWriter, selector: Line, value: Line, value_line: usize, path: &str) -> io::Result<()> {
        let context = String::from_utf8_lossy(&selector.0);
        let clean = {
            let masker = Masker::for_rule(&self.ctx.tokenizer, &self.rule.mask_text, &context, path);
            self.value.substitute(&value.0, &masker).into_owned()
        };
        if clean != value.0 {
            self.rule.record(&self.ctx, value.0.len(), clean.len(), value_line, path);
        }

        out.write_line(&selector.0, selector.1).await?;
        out.write_line(&clean, value.1).await
    }
}

impl Redactor for MultiLineRedactor {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn redact(&self, input: ByteStream, path: &str) -> ByteStream {
        let this = self.clone();
        let path = path.to_string();
        spawn_producer(move |out| this.run(input, path, out))
    }
}

// scrubsh-core/src/engines/literal.rs
//! Replaces every occurrence of a fixed byte string.
//!
//! Literals are often long opaque values (JWTs, PEM bodies), so they are not
//! subject to the length cap on rule patterns.

use std::sync::Arc;

use log::debug;
use regex::bytes::{NoExpand, Regex, RegexBuilder};
use tokio::io::BufReader;

use crate::engine::{Redactor, RedactorContext, RuleInfo};
use crate::errors::ScrubError;
use crate::line_reader::LineReader;
use crate::redaction_match::redact_sensitive;
use crate::stream::{spawn_producer, ByteStream, StreamWriter};

/// Compiled size grows with the literal; leave generous headroom over the default.
fn literal_matcher(rule_name: &str, literal: &str) -> Result<Regex, ScrubError> {
    RegexBuilder::new(&regex::escape(literal))
        .size_limit((10 * (1 << 20)).max(literal.len() * 64))
        .build()
        .map_err(|e| ScrubError::RuleCompilationError(rule_name.to_string(), e))
}

#[derive(Debug, Clone)]
pub struct LiteralRedactor {
    literal: String,
    matcher: Arc<Regex>,
    rule: RuleInfo,
    ctx: RedactorContext,
}

impl LiteralRedactor {
    pub fn new(literal: &str, rule: RuleInfo, ctx: RedactorContext) -> Result<Self, ScrubError> {
        if literal.is_empty() {
            return Err(ScrubError::EmptyLiteral(rule.name));
        }
        let matcher = Arc::new(literal_matcher(&rule.name, literal)?);
        debug!("Literal redactor '{}' built for {}", rule.name, redact_sensitive(literal));
        Ok(Self {
            literal: literal.to_string(),
            matcher,
            rule,
            ctx,
        })
    }

    async fn run(self, input: ByteStream, path: String, out: StreamWriter) -> std::io::Result<()> {
        let mut lines = LineReader::new(BufReader::new(input));
        let mut line_num = 0;

        while let Some((line, had_newline)) = lines.next_line().await? {
            line_num += 1;
            if !self.matcher.is_match(&line) {
                out.write_line(&line, had_newline).await?;
                continue;
            }

            let replacement = self
                .ctx
                .tokenizer
                .try_tokenize(self.literal.as_bytes(), &self.rule.name, &path)
                .unwrap_or_else(|| self.rule.mask_text.clone());
            let clean = self.matcher.replace_all(&line, NoExpand(replacement.as_bytes()));
            if clean.as_ref() != line.as_slice() {
                self.rule.record(&self.ctx, line.len(), clean.len(), line_num, &path);
            }
            out.write_line(&clean, had_newline).await?;
        }
        Ok(())
    }
}

impl Redactor for LiteralRedactor {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn redact(&self, input: ByteStream, path: &str) -> ByteStream {
        let this = self.clone();
        let path = path.to_string();
        spawn_producer(move |out| this.run(input, path, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::redact_bytes;
    use crate::tokenizer::{TokenizerConfig, MASK_TEXT};

    fn redactor(literal: &str, ctx: &RedactorContext) -> Vec<Box<dyn Redactor>> {
        vec![Box::new(LiteralRedactor::new(literal, RuleInfo::new("literal"), ctx.clone()).unwrap())]
    }

    #[tokio::test]
    async fn test_replaces_every_occurrence() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        let out = redact_bytes(b"pw=abc abc\nnone\nabc".to_vec(), "f.txt", &redactor("abc", &ctx))
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("pw={m} {m}\nnone\n{m}", m = MASK_TEXT)
        );

        let snapshot = ctx.ledger.snapshot().await;
        let lines: Vec<usize> = snapshot.by_file["f.txt"].iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 3]);
        assert_eq!(snapshot.by_redactor["literal"][0].characters_removed, 6 - 24);
    }

    #[tokio::test]
    async fn test_passthrough_without_match() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        for input in [&b""[..], b"\n", b"a\n\n", b"no newline", b"\x00\xff\xfe binary"] {
            let out = redact_bytes(input.to_vec(), "f", &redactor("secret", &ctx)).await.unwrap();
            assert_eq!(out, input);
        }
        assert!(ctx.ledger.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_regex_metacharacters_are_literal() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        let out = redact_bytes(b"a.b axb".to_vec(), "f", &redactor("a.b", &ctx)).await.unwrap();
        assert_eq!(out, format!("{} axb", MASK_TEXT).into_bytes());
    }

    #[tokio::test]
    async fn test_tokenizes_when_enabled() {
        let ctx = RedactorContext::isolated(TokenizerConfig {
            enabled: true,
            ..Default::default()
        });
        let out = redact_bytes(b"key hunter22\n".to_vec(), "f", &redactor("hunter22", &ctx))
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("key ***TOKEN_"), "{}", text);
        assert!(text.ends_with("***\n"));
        assert_eq!(ctx.tokenizer.file_stats("f").map(|s| s.secrets_found), Some(1));
    }

    #[tokio::test]
    async fn test_literal_longer_than_pattern_cap() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        let literal = format!("eyJ{}", "x".repeat(crate::sanitizers::compiler::MAX_PATTERN_LENGTH * 4));
        let input = format!("Authorization: Bearer {}\nnext\n", literal);
        let out = redact_bytes(input.into_bytes(), "f", &redactor(&literal, &ctx)).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("Authorization: Bearer {}\nnext\n", MASK_TEXT));
    }

    #[tokio::test]
    async fn test_custom_mask_text_when_tokenizing_blank_literal() {
        let ctx = RedactorContext::isolated(TokenizerConfig {
            enabled: true,
            ..Default::default()
        });
        let rule = RuleInfo::new("spaces").with_mask_text("[blank]");
        let redactors: Vec<Box<dyn Redactor>> = vec![Box::new(LiteralRedactor::new("   ", rule, ctx.clone()).unwrap())];
        let out = redact_bytes(b"a   b\n".to_vec(), "f", &redactors).await.unwrap();
        assert_eq!(out, b"a[blank]b\n");
        assert_eq!(ctx.tokenizer.token_count(), 0);
    }

    #[test]
    fn test_empty_literal_is_rejected() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        let err = LiteralRedactor::new("", RuleInfo::new("empty"), ctx).unwrap_err();
        assert!(matches!(err, ScrubError::EmptyLiteral(name) if name == "empty"));
    }
}

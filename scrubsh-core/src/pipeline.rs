// scrubsh-core/src/pipeline.rs
//! `pipeline.rs`
//! Folds a byte stream through an ordered list of redactors.
//!
//! Each stage reads from the one before it, so reading the final stream
//! drives the whole chain one chunk at a time and no stage holds more than a
//! line (or, for YAML, one document) in memory.

use std::io;

use tokio::io::AsyncReadExt;

use crate::config::{build_redactors, RedactionConfig};
use crate::engine::{Redactor, RedactorContext};
use crate::stream::{stream_from_bytes, ByteStream};

/// Chains `redactors` over `input`, left to right.
pub fn redact_stream(input: ByteStream, path: &str, redactors: &[Box<dyn Redactor>]) -> ByteStream {
    redactors
        .iter()
        .fold(input, |stream, redactor| redactor.redact(stream, path))
}

/// Redacts an in-memory buffer and collects the result.
///
/// A read error from any stage, including a line over the length limit, is
/// returned as is.
pub async fn redact_bytes(input: Vec<u8>, path: &str, redactors: &[Box<dyn Redactor>]) -> io::Result<Vec<u8>> {
    let mut output = redact_stream(stream_from_bytes(input), path, redactors);
    let mut redacted = Vec::new();
    output.read_to_end(&mut redacted).await?;
    Ok(redacted)
}

/// Builds the redactors that apply to `path` from `config` and runs `input`
/// through them.
pub async fn redact_with_config(
    input: Vec<u8>,
    path: &str,
    config: &RedactionConfig,
    ctx: &RedactorContext,
) -> anyhow::Result<Vec<u8>> {
    let redactors = build_redactors(config, path, ctx)?;
    Ok(redact_bytes(input, path, &redactors).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuleInfo;
    use crate::engines::literal::LiteralRedactor;
    use crate::tokenizer::TokenizerConfig;

    #[tokio::test]
    async fn test_no_redactors_is_identity() {
        let input = b"\x00\x01 raw \xff".to_vec();
        assert_eq!(redact_bytes(input.clone(), "f", &[]).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_stages_apply_in_order() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        let first = RuleInfo::new("first").with_mask_text("BBB");
        let second = RuleInfo::new("second").with_mask_text("C");
        let redactors: Vec<Box<dyn Redactor>> = vec![
            Box::new(LiteralRedactor::new("AAA", first, ctx.clone()).unwrap()),
            Box::new(LiteralRedactor::new("BBB", second, ctx.clone()).unwrap()),
        ];
        let out = redact_bytes(b"AAA BBB\n".to_vec(), "f", &redactors).await.unwrap();
        assert_eq!(out, b"C C\n".to_vec());

        let snapshot = ctx.ledger.snapshot().await;
        assert_eq!(snapshot.by_file["f"].len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_line_fails_the_stream() {
        let ctx = RedactorContext::isolated(TokenizerConfig::default());
        let redactors: Vec<Box<dyn Redactor>> =
            vec![Box::new(LiteralRedactor::new("x", RuleInfo::new("r"), ctx).unwrap())];
        let input = vec![b'a'; crate::line_reader::MAX_LINE_LEN + 1];
        let err = redact_bytes(input, "big", &redactors).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

// scrubsh-core/src/line_reader.rs
//! Binary-safe line iteration that remembers whether each line ended in `\n`.
//!
//! Redactors write a newline back only when the source line had one, so a
//! file without a final newline (or without any newline at all) comes out
//! exactly as it went in.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::errors::ScrubError;

/// Longest line accepted before the stream is failed.
pub const MAX_LINE_LEN: usize = 10 * 1024 * 1024;

pub struct LineReader<R> {
    inner: R,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, MAX_LINE_LEN)
    }

    pub fn with_max_len(inner: R, max_len: usize) -> Self {
        Self { inner, max_len }
    }

    /// Returns the next line without its `\n`, and whether it had one.
    ///
    /// `None` means end of input. An empty line that ended in `\n` comes back
    /// as `(vec![], true)`; trailing bytes without a newline as `(bytes, false)`.
    pub async fn next_line(&mut self) -> io::Result<Option<(Vec<u8>, bool)>> {
        let mut line = Vec::new();
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(if line.is_empty() { None } else { Some((line, false)) });
            }

            let (taken, found) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i, true),
                None => (available.len(), false),
            };
            if line.len() + taken > self.max_len {
                return Err(ScrubError::LineTooLong(self.max_len).into());
            }
            line.extend_from_slice(&available[..taken]);

            if found {
                self.inner.consume(taken + 1);
                return Ok(Some((line, true)));
            }
            self.inner.consume(taken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn all_lines(input: &[u8]) -> Vec<(Vec<u8>, bool)> {
        let mut reader = LineReader::new(input);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_empty_input() {
        assert!(all_lines(b"").await.is_empty());
    }

    #[tokio::test]
    async fn test_newline_topology() {
        assert_eq!(
            all_lines(b"a\n\nb").await,
            vec![(b"a".to_vec(), true), (vec![], true), (b"b".to_vec(), false)]
        );
        assert_eq!(all_lines(b"\n").await, vec![(vec![], true)]);
        assert_eq!(all_lines(b"x\n").await, vec![(b"x".to_vec(), true)]);
    }

    #[tokio::test]
    async fn test_binary_without_newlines() {
        let blob: Vec<u8> = (0u8..=255).filter(|b| *b != b'\n').collect();
        assert_eq!(all_lines(&blob).await, vec![(blob.clone(), false)]);
    }

    #[tokio::test]
    async fn test_line_across_buffer_boundaries() {
        let input = [vec![b'z'; 20_000], b"\ntail".to_vec()].concat();
        let reader = tokio::io::BufReader::with_capacity(64, &input[..]);
        let mut reader = LineReader::new(reader);
        assert_eq!(reader.next_line().await.unwrap(), Some((vec![b'z'; 20_000], true)));
        assert_eq!(reader.next_line().await.unwrap(), Some((b"tail".to_vec(), false)));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let mut reader = LineReader::with_max_len(&b"0123456789\n"[..], 4);
        let err = reader.next_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

// scrubsh-core/tests/pipeline_tests.rs
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use test_log::test;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use scrubsh_core::{
    redact_bytes, redact_stream, LineRedactor, LiteralRedactor, MultiLineRedactor, Redactor, RedactorContext,
    RuleInfo, SingleLineRedactor, TokenizerConfig, YamlRedactor, MASK_TEXT,
};

fn all_redactors(ctx: &RedactorContext) -> Vec<Box<dyn Redactor>> {
    vec![
        Box::new(LiteralRedactor::new("supersecret", RuleInfo::new("literal"), ctx.clone()).unwrap()),
        Box::new(
            SingleLineRedactor::new(
                &LineRedactor::new(r"(api_key=)(?P<mask>\w+)").with_scan("api_key"),
                RuleInfo::new("single"),
                ctx.clone(),
            )
            .unwrap(),
        ),
        Box::new(
            MultiLineRedactor::new(
                &LineRedactor::new(r#""name": *"[^"]*PASSWORD[^"]*""#),
                r#"("value": *")(?P<mask>[^"]*)(")"#,
                RuleInfo::new("multi"),
                ctx.clone(),
            )
            .unwrap(),
        ),
        Box::new(YamlRedactor::new("credentials.password", RuleInfo::new("yaml"), ctx.clone()).unwrap()),
    ]
}

#[test(tokio::test)]
async fn test_unmatched_input_is_byte_identical() {
    let ctx = RedactorContext::isolated(TokenizerConfig::default());
    let redactors = all_redactors(&ctx);

    let binary: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"\n".to_vec(),
        b"plain text\nwith trailing newline\n".to_vec(),
        b"plain text\nwithout trailing newline".to_vec(),
        b"\n\n\nblank lines\n\n".to_vec(),
        b"\xff\xfe\x00 not utf8 \x80".to_vec(),
        binary,
    ];

    for input in inputs {
        let out = redact_bytes(input.clone(), "bundle/file", &redactors).await.unwrap();
        assert_eq!(out, input);
    }
    assert!(ctx.ledger.snapshot().await.is_empty());
}

#[test(tokio::test)]
async fn test_multi_line_pair_keeps_newline_state() {
    let ctx = RedactorContext::isolated(TokenizerConfig::default());
    let redactors = all_redactors(&ctx);

    let out = redact_bytes(
        b"\"name\": \"PASSWORD\"\n\"value\": \"secret123\"".to_vec(),
        "env.json",
        &redactors,
    )
    .await
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("\"name\": \"PASSWORD\"\n\"value\": \"{}\"", MASK_TEXT)
    );
}

#[test(tokio::test)]
async fn test_every_redactor_reports_to_the_ledger() {
    let ctx = RedactorContext::isolated(TokenizerConfig::default());
    let redactors = all_redactors(&ctx);

    let input = "supersecret\napi_key=abc123\n\"name\": \"DB_PASSWORD\"\n\"value\": \"pw\"\n";
    redact_bytes(input.as_bytes().to_vec(), "mixed.txt", &redactors).await.unwrap();

    let snapshot = ctx.ledger.snapshot().await;
    for rule in ["literal", "single", "multi"] {
        assert_eq!(snapshot.by_redactor[rule].len(), 1, "{}", rule);
        assert_eq!(snapshot.by_redactor[rule][0].file, "mixed.txt");
    }
    assert_eq!(snapshot.by_redactor["multi"][0].line, 4);
    assert_eq!(snapshot.by_file["mixed.txt"].len(), 3);

    ctx.ledger.reset().await;
    assert!(ctx.ledger.snapshot().await.is_empty());
}

#[test(tokio::test)]
async fn test_yaml_stage_follows_line_stages() {
    let ctx = RedactorContext::isolated(TokenizerConfig::default());
    let redactors = all_redactors(&ctx);

    let input = "credentials:\n  user: admin\n  password: hunter2\n  other: keep\n";
    let out = redact_bytes(input.as_bytes().to_vec(), "values.yaml", &redactors).await.unwrap();
    let doc: serde_yml::Value = serde_yml::from_slice(&out).unwrap();
    assert_eq!(doc["credentials"]["password"].as_str(), Some(MASK_TEXT));
    assert_eq!(doc["credentials"]["user"].as_str(), Some("admin"));
    assert_eq!(doc["credentials"]["other"].as_str(), Some("keep"));

    let snapshot = ctx.ledger.snapshot().await;
    assert_eq!(snapshot.total(), 1);
    assert_eq!(snapshot.by_redactor["yaml"][0].line, 0);
}

/// Yields some bytes, then fails.
struct FailingReader {
    sent: bool,
}

impl AsyncRead for FailingReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if !self.sent {
            self.sent = true;
            buf.put_slice(b"first line\nsecond");
            return Poll::Ready(Ok(()));
        }
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away")))
    }
}

#[test(tokio::test)]
async fn test_source_error_reaches_the_consumer() {
    let ctx = RedactorContext::isolated(TokenizerConfig::default());
    let redactors = all_redactors(&ctx);

    let mut output = redact_stream(Box::pin(FailingReader { sent: false }), "broken", &redactors);
    let mut collected = Vec::new();
    let err = output.read_to_end(&mut collected).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_files_share_one_ledger() {
    let ctx = RedactorContext::isolated(TokenizerConfig::default());

    let mut handles = Vec::new();
    for i in 0..16 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let redactors = all_redactors(&ctx);
            let input = "supersecret\n".repeat(50);
            let path = format!("file-{}", i);
            redact_bytes(input.into_bytes(), &path, &redactors).await
        }));
    }
    for handle in handles {
        let out = handle.await.unwrap().unwrap();
        assert_eq!(out, format!("{}\n", MASK_TEXT).repeat(50).into_bytes());
    }

    let snapshot = ctx.ledger.snapshot().await;
    assert_eq!(snapshot.by_file.len(), 16);
    assert_eq!(snapshot.by_redactor["literal"].len(), 16 * 50);
}

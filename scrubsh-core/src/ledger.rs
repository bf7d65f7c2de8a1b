// scrubsh-core/src/ledger.rs
//! The redaction ledger: what was redacted, by which rule, in which file.
//!
//! Redactors append to the ledger from inside their producer tasks. Each
//! append is handed to its own tracked task so the stream never waits on the
//! ledger lock; readers and `reset` first wait for every in-flight append to
//! land. Per-key order follows the order of `record` calls.
//!
//! License: MIT OR APACHE 2.0

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::redaction_match::{log_redaction_debug, Redaction};
use crate::sanitizers::compiler::clear_regex_cache;

lazy_static! {
    static ref GLOBAL_LEDGER: RedactionLedger = RedactionLedger::new();
}

/// A consistent read of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub by_redactor: BTreeMap<String, Vec<Redaction>>,
    pub by_file: BTreeMap<String, Vec<Redaction>>,
}

impl LedgerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.by_redactor.is_empty()
    }

    pub fn total(&self) -> usize {
        self.by_redactor.values().map(Vec::len).sum()
    }
}

type Sequenced = Vec<(u64, Redaction)>;

#[derive(Debug, Default)]
struct LedgerState {
    by_redactor: BTreeMap<String, Sequenced>,
    by_file: BTreeMap<String, Sequenced>,
}

fn insert_ordered(entries: &mut Sequenced, seq: u64, redaction: Redaction) {
    let at = entries.partition_point(|(s, _)| *s < seq);
    entries.insert(at, (seq, redaction));
}

fn strip(map: &BTreeMap<String, Sequenced>) -> BTreeMap<String, Vec<Redaction>> {
    map.iter()
        .map(|(k, v)| (k.clone(), v.iter().map(|(_, r)| r.clone()).collect()))
        .collect()
}

#[derive(Debug, Default)]
struct LedgerInner {
    state: Mutex<LedgerState>,
    next_seq: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
}

impl LedgerInner {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, seq: u64, redaction: Redaction) {
        {
            let mut state = self.lock();
            insert_ordered(
                state.by_file.entry(redaction.file.clone()).or_default(),
                seq,
                redaction.clone(),
            );
            insert_ordered(
                state.by_redactor.entry(redaction.redactor_name.clone()).or_default(),
                seq,
                redaction,
            );
        }
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// A shared handle to a ledger. Clones refer to the same entries.
#[derive(Debug, Clone, Default)]
pub struct RedactionLedger {
    inner: Arc<LedgerInner>,
}

impl RedactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide ledger.
    pub fn global() -> RedactionLedger {
        GLOBAL_LEDGER.clone()
    }

    /// Appends a redaction. Inside a tokio runtime the write happens on a
    /// spawned task; outside one it is applied inline.
    pub fn record(&self, redaction: Redaction) {
        log_redaction_debug(module_path!(), &redaction);
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.fetch_add(1, Ordering::AcqRel);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move { inner.apply(seq, redaction) });
            }
            Err(_) => self.inner.apply(seq, redaction),
        }
    }

    /// Number of appends that have not landed yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.wait_idle().await;
        let state = self.inner.lock();
        LedgerSnapshot {
            by_redactor: strip(&state.by_redactor),
            by_file: strip(&state.by_file),
        }
    }

    /// Clears every entry once in-flight appends have landed, and drops the
    /// compiled regex cache with them.
    pub async fn reset(&self) {
        self.wait_idle().await;
        *self.inner.lock() = LedgerState::default();
        clear_regex_cache();
        debug!("Redaction ledger reset.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rule: &str, file: &str, line: usize) -> Redaction {
        Redaction::new(rule, 10, 4, line, file, false)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshot_waits_for_all_appends() {
        let ledger = RedactionLedger::new();
        for i in 0..500 {
            ledger.record(entry("rule", &format!("file-{}", i % 7), i));
        }
        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.total(), 500);
        assert_eq!(snapshot.by_file.values().map(Vec::len).sum::<usize>(), 500);

        let lines: Vec<usize> = snapshot.by_redactor["rule"].iter().map(|r| r.line).collect();
        assert_eq!(lines, (0..500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reset_clears_entries() {
        let ledger = RedactionLedger::new();
        ledger.record(entry("a", "x.txt", 1));
        ledger.record(entry("b", "x.txt", 2));
        assert_eq!(ledger.snapshot().await.by_file["x.txt"].len(), 2);

        ledger.reset().await;
        assert!(ledger.snapshot().await.is_empty());
        assert_eq!(ledger.pending(), 0);
    }

    #[test]
    fn test_record_outside_runtime_is_inline() {
        let ledger = RedactionLedger::new();
        ledger.record(entry("a", "x.txt", 1));
        assert_eq!(ledger.pending(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let ledger = RedactionLedger::new();
        let other = ledger.clone();
        other.record(entry("a", "x.txt", 1));
        assert_eq!(ledger.snapshot().await.total(), 1);
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending-probe bookkeeping.
//!
//! A probe lives for roughly one second: three spaced queries, then a
//! final wait. Conflicts are detected on the answer-receive path, so the
//! flag is an atomic the probing task reads at the end.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State of one in-flight probe.
#[derive(Debug)]
pub struct PendingProbe {
    /// Transaction id carried by the probe queries; a response echoing it
    /// is treated as addressed to this probe.
    pub txid: u16,
    conflict: AtomicBool,
}

impl PendingProbe {
    #[must_use]
    pub fn new(txid: u16) -> Arc<Self> {
        Arc::new(Self {
            txid,
            conflict: AtomicBool::new(false),
        })
    }

    pub fn mark_conflict(&self) {
        self.conflict.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn conflicted(&self) -> bool {
        self.conflict.load(Ordering::Relaxed)
    }
}

/// Registry of in-flight probes, consulted for every inbound answer.
#[derive(Default)]
pub struct ProbeTable {
    active: Mutex<Vec<Arc<PendingProbe>>>,
}

impl ProbeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, probe: Arc<PendingProbe>) {
        self.active.lock().push(probe);
    }

    pub fn unregister(&self, txid: u16) {
        self.active.lock().retain(|p| p.txid != txid);
    }

    /// Called from the answer path: an answer with a matching id and a
    /// non-empty answer section means someone already holds the name.
    pub fn observe_answer(&self, message_id: u16, answer_count: usize) {
        if answer_count == 0 {
            return;
        }
        for probe in self.active.lock().iter() {
            if probe.txid == message_id {
                log::debug!("[probe] conflict observed for txid {:#06x}", message_id);
                probe.mark_conflict();
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_needs_matching_id_and_answers() {
        let table = ProbeTable::new();
        let probe = PendingProbe::new(0x1234);
        table.register(Arc::clone(&probe));

        table.observe_answer(0x9999, 1); // wrong id
        assert!(!probe.conflicted());

        table.observe_answer(0x1234, 0); // empty answer section
        assert!(!probe.conflicted());

        table.observe_answer(0x1234, 1);
        assert!(probe.conflicted());
    }

    #[test]
    fn test_unregister_removes_probe() {
        let table = ProbeTable::new();
        let probe = PendingProbe::new(7);
        table.register(Arc::clone(&probe));
        assert_eq!(table.len(), 1);
        table.unregister(7);
        assert!(table.is_empty());
        table.observe_answer(7, 1);
        assert!(!probe.conflicted());
    }
}

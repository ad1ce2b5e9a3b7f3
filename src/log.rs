//! Log Store + Apply Channel (§4.3): the ordered entry sequence, the
//! prev-log-match/truncate acceptance rule (§9 redesign decision #2), and
//! the commit-notification plumbing that wakes `SubmitOperation` waiters.

use crate::state_machine::StateMachine;
use crate::types::{LogEntry, Term};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// The replicated, 1-indexed, gap-free sequence of log entries (§3).
#[derive(Debug, Default)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Log { entries: Vec::new() }
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_index(&self) -> u64 {
        self.len()
    }

    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(Term::ZERO)
    }

    /// Term of the entry at 1-based `index`, or `None` for `index == 0` or
    /// an index past the end of the log.
    pub fn term_at(&self, index: u64) -> Option<Term> {
        if index == 0 {
            return None;
        }
        self.entries.get((index - 1) as usize).map(|e| e.term)
    }

    pub fn entry_at(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get((index - 1) as usize)
    }

    /// All entries from `from_index` (1-based, inclusive) to the end.
    pub fn entries_from(&self, from_index: u64) -> Vec<LogEntry> {
        if from_index == 0 || from_index > self.len() {
            return Vec::new();
        }
        self.entries[(from_index - 1) as usize..].to_vec()
    }

    /// Leader-side append of a freshly-submitted operation. Returns the new
    /// entry's index.
    pub fn append(&mut self, term: Term, operation: String) -> u64 {
        let index = self.last_index() + 1;
        self.entries.push(LogEntry { index, term, operation });
        index
    }

    /// Follower-side acceptance of a leader's `AppendEntries` (§4.1,
    /// redesigned per §9 to use prev-log-match + truncate instead of
    /// whole-log overwrite). Returns `Ok(last_new_index)` on a match, or
    /// `Err(())` if the follower's log has no entry at `prev_log_index`
    /// with term `prev_log_term`.
    pub fn accept_from_leader(
        &mut self,
        prev_log_index: u64,
        prev_log_term: Term,
        entries: &[LogEntry],
    ) -> Result<u64, ()> {
        if prev_log_index > 0 {
            match self.term_at(prev_log_index) {
                Some(term) if term == prev_log_term => {}
                _ => return Err(()),
            }
        }

        let mut insert_at = prev_log_index; // 0-based offset into `entries` equals 1-based next index
        for entry in entries {
            let idx = insert_at; // 0-based slot for the next entry
            match self.entries.get(idx as usize) {
                Some(existing) if existing.term == entry.term => {
                    // Already present and matching; nothing to do.
                }
                Some(_) => {
                    // Conflict: truncate the divergent suffix and append from here.
                    self.entries.truncate(idx as usize);
                    self.entries.push(entry.clone());
                }
                None => {
                    self.entries.push(entry.clone());
                }
            }
            insert_at += 1;
        }

        Ok(prev_log_index + entries.len() as u64)
    }
}

/// Delivers commit notifications to `SubmitOperation` waiters as the commit
/// index advances (§4.3, §2 "State Machine Apply Channel").
#[derive(Default)]
pub struct ApplyChannel {
    pending: HashMap<u64, oneshot::Sender<String>>,
}

impl ApplyChannel {
    pub fn new() -> Self {
        ApplyChannel { pending: HashMap::new() }
    }

    /// Register interest in the commit of `index`, returning a receiver that
    /// resolves with the applied result string.
    pub fn register(&mut self, index: u64) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(index, tx);
        rx
    }

    pub fn cancel(&mut self, index: u64) {
        self.pending.remove(index);
    }

    /// Apply every newly-committed index in `last_applied+1 ..= commit_index`,
    /// in order, via `state_machine`, and wake any registered waiter.
    /// Returns the new `last_applied`.
    ///
    /// Panics if an index in that range is missing from `log` — per §7 this
    /// indicates a corrupted invariant, not a runtime condition to recover
    /// from.
    pub fn apply_committed(
        &mut self,
        log: &Log,
        last_applied: u64,
        commit_index: u64,
        state_machine: &dyn StateMachine,
    ) -> u64 {
        let mut applied = last_applied;
        while applied < commit_index {
            let next = applied + 1;
            let entry = log
                .entry_at(next)
                .unwrap_or_else(|| panic!("invariant violation: committed index {} missing from log", next));

            let result = state_machine.apply(entry);
            if let Some(tx) = self.pending.remove(&next) {
                let _ = tx.send(result);
            }
            applied = next;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::EchoStateMachine;

    #[test]
    fn append_assigns_increasing_indices() {
        let mut log = Log::new();
        assert_eq!(log.append(Term(1), "a".into()), 1);
        assert_eq!(log.append(Term(1), "b".into()), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn accept_from_leader_appends_when_log_empty() {
        let mut log = Log::new();
        let entries = vec![
            LogEntry { index: 1, term: Term(1), operation: "a".into() },
            LogEntry { index: 2, term: Term(1), operation: "b".into() },
        ];
        let last = log.accept_from_leader(0, Term::ZERO, &entries).unwrap();
        assert_eq!(last, 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn accept_from_leader_rejects_prev_mismatch() {
        let mut log = Log::new();
        log.append(Term(1), "a".into());
        let entries = vec![LogEntry { index: 2, term: Term(1), operation: "b".into() }];
        // prev_log_term doesn't match what's actually at index 1.
        let result = log.accept_from_leader(1, Term(2), &entries);
        assert!(result.is_err());
    }

    #[test]
    fn accept_from_leader_truncates_conflicting_suffix() {
        let mut log = Log::new();
        log.append(Term(1), "a".into());
        log.append(Term(1), "stale".into());

        let new_entries = vec![LogEntry { index: 2, term: Term(2), operation: "fresh".into() }];
        let last = log.accept_from_leader(1, Term(1), &new_entries).unwrap();
        assert_eq!(last, 2);
        assert_eq!(log.entry_at(2).unwrap().operation, "fresh");
        assert_eq!(log.entry_at(2).unwrap().term, Term(2));
    }

    #[test]
    fn accept_from_leader_does_not_disturb_already_applied_prefix() {
        // A prefix that's already committed/applied must never be replaced
        // as long as the leader's prev-log-match succeeds against it.
        let mut log = Log::new();
        log.append(Term(1), "a".into());
        log.append(Term(1), "b".into());

        let entries = vec![LogEntry { index: 3, term: Term(1), operation: "c".into() }];
        let last = log.accept_from_leader(2, Term(1), &entries).unwrap();
        assert_eq!(last, 3);
        assert_eq!(log.entry_at(1).unwrap().operation, "a");
        assert_eq!(log.entry_at(2).unwrap().operation, "b");
    }

    #[tokio::test]
    async fn apply_committed_delivers_results_in_order() {
        let mut log = Log::new();
        log.append(Term(1), "a".into());
        log.append(Term(1), "b".into());

        let mut channel = ApplyChannel::new();
        let rx1 = channel.register(1);
        let rx2 = channel.register(2);

        let sm = EchoStateMachine;
        let new_last_applied = channel.apply_committed(&log, 0, 2, &sm);
        assert_eq!(new_last_applied, 2);

        assert_eq!(rx1.await.unwrap(), "Executed a at index 1 (term 1)");
        assert_eq!(rx2.await.unwrap(), "Executed b at index 2 (term 1)");
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn apply_committed_panics_on_missing_entry() {
        let log = Log::new();
        let mut channel = ApplyChannel::new();
        let sm = EchoStateMachine;
        channel.apply_committed(&log, 0, 1, &sm);
    }
}

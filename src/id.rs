//! Message identifier generation.
//!
//! Ids are `YYYYMMDD_HHMMSS_<micros>_<pid><seq>`: local wall-clock time, the
//! microsecond part, then a process-local token. Every field is fixed width
//! so ids sort lexically in creation order within one process, which is what
//! the queue reader falls back on when two files share a modification time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Timelike;

use crate::clock::Clock;
use crate::model::MessageId;

/// Attempts at a fresh token before falling back to a random nonce.
const MAX_ATTEMPTS: u32 = 64;

/// Shared by every generator in the process so two stores on the same
/// directory never hand out the same token.
static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Produces identifiers that are not yet taken in a queue directory.
pub trait IdGenerator: Send + Sync {
    /// Generate an id for which `taken` returns false.
    fn generate(&self, taken: &dyn Fn(&MessageId) -> bool) -> MessageId;
}

/// Time-based generator with a collision check.
pub struct TimestampIdGenerator {
    clock: Arc<dyn Clock>,
    sequence: &'static AtomicU32,
    pid: u32,
}

impl TimestampIdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_sequence(clock, &SEQUENCE)
    }

    pub(crate) fn with_sequence(clock: Arc<dyn Clock>, sequence: &'static AtomicU32) -> Self {
        Self {
            clock,
            sequence,
            pid: std::process::id(),
        }
    }

    fn candidate(&self, seq: u32) -> String {
        let now = self.clock.now();
        // chrono reports leap seconds as nanos >= 1e9; clamp to keep 6 digits
        let micros = (now.nanosecond() / 1_000).min(999_999);
        format!(
            "{}_{micros:06}_{:08x}{seq:08x}",
            now.format("%Y%m%d_%H%M%S"),
            self.pid
        )
    }
}

impl IdGenerator for TimestampIdGenerator {
    fn generate(&self, taken: &dyn Fn(&MessageId) -> bool) -> MessageId {
        let mut last = String::new();
        for _ in 0..MAX_ATTEMPTS {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let id = MessageId::from_generated(self.candidate(seq));
            if !taken(&id) {
                return id;
            }
            tracing::debug!(id = %id, "message id already taken, retrying");
            last = id.to_string();
        }

        // Clock stuck and sequence space exhausted around it; a random nonce
        // ends the loop.
        loop {
            let nonce = uuid::Uuid::new_v4().simple();
            let id = MessageId::from_generated(format!("{last}_{nonce}"));
            if !taken(&id) {
                tracing::warn!(id = %id, "fell back to random nonce for message id");
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{Local, TimeZone};
    use std::collections::HashSet;

    fn stuck_clock() -> Arc<dyn Clock> {
        let at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Arc::new(FixedClock::new(at))
    }

    #[test]
    fn ids_are_unique_under_stuck_clock() {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let id_gen = TimestampIdGenerator::with_sequence(stuck_clock(), &SEQ);

        let ids: HashSet<MessageId> = (0..1_000).map(|_| id_gen.generate(&|_| false)).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn id_embeds_timestamp_and_sorts_in_generation_order() {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let id_gen = TimestampIdGenerator::with_sequence(stuck_clock(), &SEQ);

        let first = id_gen.generate(&|_| false);
        let second = id_gen.generate(&|_| false);

        assert!(first.as_str().starts_with("20240101_120000_000000_"));
        assert!(first < second);
    }

    #[test]
    fn taken_ids_are_skipped() {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let id_gen = TimestampIdGenerator::with_sequence(stuck_clock(), &SEQ);
        let blocked: HashSet<String> = (0..3).map(|seq| id_gen.candidate(seq)).collect();

        let id = id_gen.generate(&|id| blocked.contains(id.as_str()));

        assert!(!blocked.contains(id.as_str()));
        assert_eq!(id.as_str(), id_gen.candidate(3));
    }

    #[test]
    fn exhausted_retries_fall_back_to_nonce() {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let id_gen = TimestampIdGenerator::with_sequence(stuck_clock(), &SEQ);
        let blocked: HashSet<String> = (0..MAX_ATTEMPTS).map(|seq| id_gen.candidate(seq)).collect();

        let id = id_gen.generate(&|id| blocked.contains(id.as_str()));

        assert!(!blocked.contains(id.as_str()));
        assert!(id.as_str().starts_with(&id_gen.candidate(MAX_ATTEMPTS - 1)));
        assert!(MessageId::parse(id.as_str()).is_ok());
    }
}

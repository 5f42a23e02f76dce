//! Ordered dequeue.
//!
//! The oldest pending file (by modification time, then by id) is the head of
//! the queue. Reading does not claim anything: two readers on one directory
//! can both get the same head until one of them acks it. Callers that need
//! single delivery must put a reservation step (rename-before-read or a lease
//! file) on top.

use std::io::ErrorKind;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{MessageId, PendingMessage, Record};
use crate::storage::{MessageStore, read_record};

/// Peeks at the head of a [`MessageStore`].
pub struct QueueReader<'a> {
    store: &'a MessageStore,
}

impl<'a> QueueReader<'a> {
    pub fn new(store: &'a MessageStore) -> Self {
        Self { store }
    }

    /// All pending messages, oldest first.
    pub fn ordered(&self) -> Result<Vec<PendingMessage>> {
        let mut pending = self.store.pending()?;
        sort_oldest_first(&mut pending);
        Ok(pending)
    }

    /// The oldest pending message, or `None` if the queue is empty.
    ///
    /// Returns one message per call and does not remove it. If the chosen
    /// file disappears before it can be read (another consumer acked it) the
    /// next one is tried; any other failure is returned and the file stays.
    pub fn next(&self) -> Result<Option<(MessageId, Record)>> {
        for candidate in self.ordered()? {
            match read_record(&candidate.path) {
                Ok(record) => {
                    debug!(id = %candidate.id, "message dequeued");
                    return Ok(Some((candidate.id, record)));
                }
                Err(Error::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    debug!(id = %candidate.id, "head vanished before read, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Modification time ascending; the id breaks ties so the order is the same
/// on every call.
fn sort_oldest_first(pending: &mut [PendingMessage]) {
    pending.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.cmp(&b.id)));
}

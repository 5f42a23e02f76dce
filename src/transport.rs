//! Typed transport: the public API for sending and receiving messages.
//!
//! Wraps a [`MessageStore`] with a [`Codec`] so callers deal in
//! [`Envelope`]s. The envelope carries the id of its backing file from
//! `send`/`get` to `ack`/`reject`.

use serde_json::{Map, Value};

use crate::codec::Codec;
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::model::{Envelope, MessageId};
use crate::storage::MessageStore;

/// A filesystem queue speaking in terms of `C::Message`.
pub struct Transport<C: Codec> {
    store: MessageStore,
    codec: C,
}

impl<C: Codec> Transport<C> {
    pub fn new(store: MessageStore, codec: C) -> Self {
        Self { store, codec }
    }

    /// Open a transport from validated configuration.
    pub fn open(config: &TransportConfig, codec: C) -> Result<Self> {
        Ok(Self::new(MessageStore::open(config)?, codec))
    }

    /// Build a transport from a `filesystem://` DSN and its options.
    ///
    /// Options are validated before the directory is touched.
    pub fn from_dsn(dsn: &str, options: &Map<String, Value>, codec: C) -> Result<Self> {
        let config = TransportConfig::from_dsn(dsn, options)?;
        Self::open(&config, codec)
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Encode and enqueue. Returns the envelope with its id bound.
    pub fn send(&self, envelope: Envelope<C::Message>) -> Result<Envelope<C::Message>> {
        let record = self.codec.encode(envelope.message())?;
        let id = self.store.enqueue(&record)?;
        Ok(envelope.with_id(id))
    }

    /// The oldest pending message, decoded, with its id bound.
    pub fn get(&self) -> Result<Option<Envelope<C::Message>>> {
        let Some((id, record)) = self.store.reader().next()? else {
            return Ok(None);
        };
        let message = self.codec.decode(&record)?;
        Ok(Some(Envelope::new(message).with_id(id)))
    }

    /// Mark the envelope's message processed and delete its file.
    pub fn ack(&self, envelope: &Envelope<C::Message>) -> Result<()> {
        let id = bound_id(envelope)?;
        self.store
            .ack(id, &self.codec.message_type(envelope.message()))
    }

    /// Mark the envelope's message failed and delete its file.
    pub fn reject(&self, envelope: &Envelope<C::Message>) -> Result<()> {
        let id = bound_id(envelope)?;
        self.store
            .reject(id, &self.codec.message_type(envelope.message()))
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.store.pending_count()
    }
}

fn bound_id<M>(envelope: &Envelope<M>) -> Result<&MessageId> {
    envelope.id().ok_or_else(|| {
        Error::InvariantViolation("envelope has no message id; it was not sent or received through this transport".into())
    })
}

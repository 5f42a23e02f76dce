//! Message codecs.
//!
//! The store only moves [`Record`]s. A codec turns application messages into
//! records and back; [`JsonCodec`] is the default for any serde type.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::model::Record;

/// Header carrying the message type name.
pub const TYPE_HEADER: &str = "type";

/// Converts between an application message and its transportable record.
pub trait Codec: Send + Sync {
    type Message;

    fn encode(&self, message: &Self::Message) -> Result<Record>;

    fn decode(&self, record: &Record) -> Result<Self::Message>;

    /// Name written to the outcome log for this message.
    fn message_type(&self, _message: &Self::Message) -> String {
        std::any::type_name::<Self::Message>().to_string()
    }
}

/// Encodes `T` as a JSON body and records its type name in a header.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Message = T;

    fn encode(&self, message: &T) -> Result<Record> {
        let body = serde_json::to_string(message).map_err(|e| Error::Codec(Box::new(e)))?;
        Ok(Record::new(body).header(TYPE_HEADER, std::any::type_name::<T>()))
    }

    fn decode(&self, record: &Record) -> Result<T> {
        serde_json::from_str(&record.body).map_err(|e| Error::Codec(Box::new(e)))
    }
}

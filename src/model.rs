//! Core data model.
//!
//! A pending message is a file. Its name is the [`MessageId`]; its content is
//! a [`Record`] produced by a codec. Once acked or rejected the file is gone
//! and only an [`OutcomeEntry`](crate::outcome::OutcomeEntry) may remain.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File extension of every pending message.
pub const MESSAGE_EXTENSION: &str = ".message";

// ---------------------------------------------------------------------------
// Message Id
// ---------------------------------------------------------------------------

/// Identifier of a pending message, unique within its queue directory.
///
/// Doubles as the file stem, so only a conservative character set is
/// accepted: ASCII alphanumerics, `_`, `-` and `.`, not starting with `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Validate an identifier coming from outside the store.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(Self(raw))
        } else {
            Err(Error::InvalidId(raw))
        }
    }

    /// Build from a file name such as `20260101_120000_000001_....message`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(MESSAGE_EXTENSION)?;
        Self::parse(stem).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generators produce ids in the safe alphabet by construction.
    pub(crate) fn from_generated(raw: String) -> Self {
        debug_assert!(Self::parse(raw.clone()).is_ok(), "generated id {raw:?}");
        Self(raw)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MessageId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The transportable form of an application message. Opaque to the store.
///
/// Serialized as-is into the message file, so the on-disk wrapper is one
/// JSON object with a `body` string and a `headers` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Record {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Pending Message
// ---------------------------------------------------------------------------

/// A message file seen in a directory listing.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: MessageId,
    pub path: PathBuf,
    /// Modification time. Orders the queue.
    pub modified: SystemTime,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Terminal disposition of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Acked: the consumer handled it.
    Processed,
    /// Rejected: the consumer gave up on it.
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Processed => "processed",
            Status::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processed" => Ok(Status::Processed),
            "failed" => Ok(Status::Failed),
            _ => Err(Error::Configuration(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// An application message plus the id of the file that carries it.
///
/// The id is bound by [`Transport::send`](crate::transport::Transport::send)
/// and [`Transport::get`](crate::transport::Transport::get); ack and reject
/// need it to find the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    message: M,
    id: Option<MessageId>,
}

impl<M> Envelope<M> {
    pub fn new(message: M) -> Self {
        Self { message, id: None }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn into_message(self) -> M {
        self.message
    }
}

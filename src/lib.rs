//! # fsqueue
//!
//! Durable filesystem-backed message queue.
//!
//! Each pending message is one `<id>.message` file in a queue directory.
//! Producers enqueue by writing a file, consumers read the oldest one, and
//! ack/reject deletes it, optionally appending to a per-day outcome log.
//! Delivery is at-least-once; crash recovery is "whatever is on disk is
//! still pending".

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod id;
pub mod model;
pub mod outcome;
pub mod reader;
pub mod storage;
pub mod telemetry;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use config::TransportConfig;
pub use error::{Error, Result};
pub use model::{Envelope, MessageId, Record, Status};
pub use reader::QueueReader;
pub use storage::MessageStore;
pub use transport::Transport;

//! Queue operation span helpers.

use tracing::Span;

use crate::model::MessageId;

/// Start a span for one store operation on one message.
///
/// Events emitted while the span is entered carry the operation name and
/// the message id.
pub fn operation_span(operation: &'static str, id: &MessageId) -> Span {
    tracing::debug_span!(
        "queue.operation",
        "queue.operation" = operation,
        "queue.message_id" = %id,
    )
}

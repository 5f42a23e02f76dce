//! Integration tests for telemetry initialization and span helpers.

use fsqueue::MessageId;
use fsqueue::telemetry::{TelemetryConfig, init_telemetry, queue::operation_span};

#[test]
fn telemetry_initializes_once() {
    // A global subscriber can only be set once per process; the second call
    // must report that instead of panicking.
    let _ = init_telemetry(TelemetryConfig::default());
    let second = init_telemetry(TelemetryConfig {
        default_filter: "debug".to_string(),
        compact: true,
    });
    assert!(second.is_err());
}

#[test]
fn operation_span_can_be_entered() {
    let id = MessageId::parse("20260101_000000_000000_0000000100000001").unwrap();
    let span = operation_span("ack", &id);
    let _enter = span.enter();
    tracing::info!("inside span");
}

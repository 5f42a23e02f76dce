//! Integration tests for the typed transport: send → get → ack/reject.

use std::fs;

use chrono::Local;
use fsqueue::outcome::OutcomeEntry;
use fsqueue::{Envelope, Error, JsonCodec, Status, Transport, TransportConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: u64,
    sku: String,
}

fn order(order_id: u64) -> OrderPlaced {
    OrderPlaced {
        order_id,
        sku: format!("SKU-{order_id}"),
    }
}

fn options(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn open(dir: &std::path::Path, log: bool) -> Transport<JsonCodec<OrderPlaced>> {
    Transport::open(&TransportConfig::new(dir).log(log), JsonCodec::new())
        .expect("failed to open transport")
}

fn today_entries(transport: &Transport<JsonCodec<OrderPlaced>>, status: Status) -> Vec<OutcomeEntry> {
    transport
        .store()
        .outcomes()
        .entries(status, Local::now().date_naive())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn send_binds_an_id_and_get_decodes_the_message() {
    let dir = tempfile::tempdir().unwrap();
    let transport = open(dir.path(), false);

    let sent = transport.send(Envelope::new(order(1))).unwrap();
    let sent_id = sent.id().cloned().expect("send binds an id");

    let received = transport.get().unwrap().expect("one message pending");
    assert_eq!(received.id(), Some(&sent_id));
    assert_eq!(received.message(), &order(1));

    // Still pending until acked.
    assert_eq!(transport.pending_count().unwrap(), 1);
    transport.ack(&received).unwrap();
    assert_eq!(transport.pending_count().unwrap(), 0);
    assert!(transport.get().unwrap().is_none());
}

#[test]
fn on_disk_wrapper_has_body_and_type_header() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Transport::open(&TransportConfig::new(dir.path()), JsonCodec::<Value>::new())
        .unwrap();

    let sent = transport.send(Envelope::new(json!({"x": 1}))).unwrap();

    let path = transport.store().path_for(sent.id().unwrap());
    let wrapper: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(wrapper["body"], r#"{"x":1}"#);
    assert!(wrapper["headers"]["type"].is_string());

    let received = transport.get().unwrap().unwrap();
    assert_eq!(received.into_message(), json!({"x": 1}));
}

#[test]
fn ack_logs_processed_with_message_type() {
    let dir = tempfile::tempdir().unwrap();
    let transport = open(dir.path(), true);
    transport.send(Envelope::new(order(7))).unwrap();

    let received = transport.get().unwrap().unwrap();
    transport.ack(&received).unwrap();

    let entries = today_entries(&transport, Status::Processed);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Status::Processed);
    assert_eq!(&entries[0].message_id, received.id().unwrap().as_str());
    assert!(entries[0].message_type.ends_with("OrderPlaced"));
    assert!(today_entries(&transport, Status::Failed).is_empty());
}

#[test]
fn reject_logs_failed() {
    let dir = tempfile::tempdir().unwrap();
    let transport = open(dir.path(), true);
    transport.send(Envelope::new(order(9))).unwrap();

    let received = transport.get().unwrap().unwrap();
    transport.reject(&received).unwrap();
    transport.reject(&received).unwrap();

    let entries = today_entries(&transport, Status::Failed);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Status::Failed);
    assert_eq!(transport.pending_count().unwrap(), 0);
}

#[test]
fn ack_of_a_sent_envelope_works_without_get() {
    let dir = tempfile::tempdir().unwrap();
    let transport = open(dir.path(), false);

    let sent = transport.send(Envelope::new(order(3))).unwrap();
    transport.ack(&sent).unwrap();

    assert_eq!(transport.pending_count().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Contract violations and failures
// ---------------------------------------------------------------------------

#[test]
fn ack_without_bound_id_is_an_invariant_violation() {
    let dir = tempfile::tempdir().unwrap();
    let transport = open(dir.path(), false);
    transport.send(Envelope::new(order(1))).unwrap();

    let unbound = Envelope::new(order(1));

    assert!(matches!(transport.ack(&unbound), Err(Error::InvariantViolation(_))));
    assert!(matches!(transport.reject(&unbound), Err(Error::InvariantViolation(_))));
    assert_eq!(transport.pending_count().unwrap(), 1);
}

#[test]
fn undecodable_message_is_a_codec_error_and_stays_pending() {
    let dir = tempfile::tempdir().unwrap();
    let transport = open(dir.path(), false);
    transport
        .store()
        .enqueue(&fsqueue::Record::new(r#"{"not":"an order"}"#))
        .unwrap();

    let err = transport.get().unwrap_err();

    assert!(matches!(err, Error::Codec(_)), "got {err:?}");
    assert_eq!(transport.pending_count().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[test]
fn from_dsn_creates_the_configured_directory() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("orders");

    let transport = Transport::from_dsn(
        "filesystem://default",
        &options(json!({ "directory": dir.to_str().unwrap(), "log": true })),
        JsonCodec::<OrderPlaced>::new(),
    )
    .unwrap();

    assert!(dir.is_dir());
    assert!(transport.store().outcomes().is_enabled());
}

#[test]
fn from_dsn_validates_before_touching_disk() {
    let missing = Transport::from_dsn(
        "filesystem://default",
        &options(json!({ "log": true })),
        JsonCodec::<OrderPlaced>::new(),
    );
    assert!(matches!(missing, Err(Error::Configuration(_))));

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("never");
    let wrong_scheme = Transport::from_dsn(
        "amqp://localhost",
        &options(json!({ "directory": dir.to_str().unwrap() })),
        JsonCodec::<OrderPlaced>::new(),
    );
    assert!(matches!(wrong_scheme, Err(Error::Configuration(_))));
    assert!(!dir.exists());
}

//! Server frame builders.

use serde_json::{json, Value};

/// Handshake trigger `{"id", "status"}`.
pub fn hello(id: &str) -> Vec<u8> {
    json!({ "id": id, "status": "ok" }).to_string().into_bytes()
}

/// Acknowledgment `{"id", "status", "stream"}`.
pub fn ack(id: &str, stream: &str) -> Vec<u8> {
    json!({ "id": id, "status": "ok", "stream": stream })
        .to_string()
        .into_bytes()
}

/// Stream message `{"offset", "partition", "body"}`.
pub fn message(partition: i32, offset: i64, body: Value) -> Vec<u8> {
    json!({ "offset": offset, "partition": partition, "body": body })
        .to_string()
        .into_bytes()
}

//! Tests for the decode/enrich/publish pipeline

use super::{Pipeline, PipelineConfig};
use crate::buffer::GrowthPolicy;
use crate::enrich::{EnrichmentDb, SharedEnrichment};
use crate::session::SessionIdentity;
use crossbeam::channel::Receiver;
use serde_json::{Value, json};
use sluice_sinks::{ChannelSink, Message};
use std::sync::Arc;

fn database() -> EnrichmentDb {
    EnrichmentDb::from_value(json!({
        "uuids": {
            "abc": {"sensor_uuid": "abc", "a": 1, "b": "c", "d": true, "e": null},
            "def": {"sensor_uuid": "def", "f": 1, "g": "w", "h": false, "i": null},
            "ghi": {"o": {"a": 90}},
            "jkl": {"v": [1, 2, 3, 4, 5]},
            "rb-assoc": {"mse_site": "hq"}
        },
        "topics": {
            "rb_flow": {"partition_key": "client_mac", "partition_algo": "mac"},
            "rb_event": {}
        }
    }))
    .unwrap()
}

fn pipeline_with(growth: GrowthPolicy) -> (Pipeline, Receiver<Message>) {
    let (sink, rx) = ChannelSink::unbounded();
    let config = PipelineConfig {
        default_topic: "default".into(),
        growth,
    };
    let pipeline = Pipeline::new(config, SharedEnrichment::new(database()), Arc::new(sink));
    (pipeline, rx)
}

fn pipeline() -> (Pipeline, Receiver<Message>) {
    pipeline_with(GrowthPolicy::default())
}

fn sensor(uuid: &str) -> SessionIdentity {
    SessionIdentity::sensor("test_ip", uuid, "rb_flow")
}

fn received(rx: &Receiver<Message>) -> Vec<(Message, Value)> {
    rx.try_iter()
        .map(|m| {
            let value = serde_json::from_slice(&m.payload).unwrap();
            (m, value)
        })
        .collect()
}

fn assert_abc_enriched(value: &Value, mac: &str) {
    assert_eq!(value["client_mac"], json!(mac));
    assert_eq!(value["application_name"], json!("wwww"));
    assert_eq!(value["sensor_uuid"], json!("abc"));
    assert_eq!(value["a"], json!(1), "enrichment replaces the original 5");
    assert_eq!(value["b"], json!("c"));
    assert_eq!(value["d"], json!(true));
    assert_eq!(value["e"], Value::Null);
}

#[test]
fn test_simple_message() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(
        &mut session,
        br#"{"client_mac": "54:26:96:db:88:01", "application_name": "wwww", "sensor_uuid":"abc", "a":5}"#,
    );

    let out = received(&rx);
    assert_eq!(out.len(), 1);
    assert_abc_enriched(&out[0].1, "54:26:96:db:88:01");
    assert_eq!(out[0].0.topic, "rb_flow");
    assert_eq!(out[0].0.partition_key, Some(0x5426_96db_8801));
}

#[test]
fn test_double_message() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(
        &mut session,
        concat!(
            r#"{"client_mac": "54:26:96:db:88:01", "application_name": "wwww", "sensor_uuid":"abc", "a":5}"#,
            r#"{"client_mac": "54:26:96:db:88:02", "application_name": "wwww", "sensor_uuid":"abc", "a":5}"#
        )
        .as_bytes(),
    );

    let out = received(&rx);
    assert_eq!(out.len(), 2);
    assert_abc_enriched(&out[0].1, "54:26:96:db:88:01");
    assert_abc_enriched(&out[1].1, "54:26:96:db:88:02");
    assert_eq!(out[1].0.partition_key, Some(0x5426_96db_8802));
}

#[test]
fn test_half_string_then_rest() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(
        &mut session,
        br#"{"client_mac": "54:26:96:db:88:01", "application_name": "ww"#,
    );
    assert!(rx.is_empty());
    assert!(!session.buffer().pending().is_empty());

    pipeline.process(&mut session, br#"ww", "sensor_uuid":"abc", "a":5}"#);

    let out = received(&rx);
    assert_eq!(out.len(), 1);
    assert_abc_enriched(&out[0].1, "54:26:96:db:88:01");
}

#[test]
fn test_half_key_then_rest() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(&mut session, br#"{"client_mac": "54:26:96:db:88:01", "appli"#);
    assert!(rx.is_empty());
    pipeline.process(&mut session, br#"cation_name": "wwww", "sensor_uuid":"abc", "a":5}"#);

    let out = received(&rx);
    assert_eq!(out.len(), 1);
    assert_abc_enriched(&out[0].1, "54:26:96:db:88:01");
}

#[test]
fn test_object_kept_and_enriched() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(
        &mut session,
        br#"{"client_mac": "54:26:96:db:88:01", "application_name": "wwww", "sensor_uuid":"abc", "a":5, "object": {"t1": 1}}"#,
    );

    let out = received(&rx);
    assert_abc_enriched(&out[0].1, "54:26:96:db:88:01");
    assert_eq!(out[0].1["object"], json!({"t1": 1}));
}

#[test]
fn test_object_enrichment() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("ghi"));

    pipeline.process(
        &mut session,
        br#"{"client_mac": "54:26:96:db:88:01", "application_name": "wwww", "sensor_uuid":"ghi", "a":5}"#,
    );

    let out = received(&rx);
    assert_eq!(out[0].1["sensor_uuid"], json!("ghi"));
    assert_eq!(out[0].1["a"], json!(5));
    assert_eq!(out[0].1["o"], json!({"a": 90}));
}

#[test]
fn test_array_enrichment() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("jkl"));

    pipeline.process(
        &mut session,
        br#"{"client_mac": "54:26:96:db:88:01", "application_name": "wwww", "sensor_uuid":"jkl", "g": ["a", 1, false]}"#,
    );

    let out = received(&rx);
    assert_eq!(out[0].1["g"], json!(["a", 1, false]));
    assert_eq!(out[0].1["v"], json!([1, 2, 3, 4, 5]));
}

#[test]
fn test_unknown_identity_passthrough() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(SessionIdentity::client("10.1.1.1"));
    let input = json!({"client_mac": "54:26:96:db:88:01", "a": 5});

    pipeline.process(&mut session, input.to_string().as_bytes());

    let out = received(&rx);
    assert_eq!(out[0].1, input);
    assert_eq!(out[0].0.topic, "default");
    assert_eq!(out[0].0.partition_key, None);
}

#[test]
fn test_topic_without_partitioning() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(SessionIdentity::sensor("ip", "def", "rb_event"));

    pipeline.process(&mut session, br#"{"client_mac": "54:26:96:db:88:01"}"#);

    let out = received(&rx);
    assert_eq!(out[0].0.topic, "rb_event");
    assert_eq!(out[0].0.partition_key, None);
    assert_eq!(out[0].1["g"], json!("w"));
}

#[test]
fn test_malformed_then_valid() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(&mut session, b"{\"a\" 1}");
    pipeline.process(&mut session, b"{\"x\":1}");

    let out = received(&rx);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].1["x"], json!(1));

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.malformed_regions, 1);
    assert_eq!(snapshot.bytes_discarded, 7);
}

#[test]
fn test_finish_discards_incomplete() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(&mut session, b"{\"a\":1}{\"b\":");
    pipeline.finish(&mut session);

    assert_eq!(received(&rx).len(), 1);
    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.bytes_discarded, 5);
    assert_eq!(snapshot.sessions_active(), 0);
}

#[test]
fn test_faulted_session_skips_publish() {
    let (pipeline, rx) = pipeline_with(GrowthPolicy::new(8, 2, 16));
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(&mut session, b"{\"a\":\"0123456789abcdef\"}");
    pipeline.process(&mut session, b"{\"a\":1}");
    pipeline.finish(&mut session);

    assert!(rx.is_empty());
    assert!(session.is_faulted());
    assert_eq!(pipeline.metrics().snapshot().sessions_faulted, 1);
}

#[test]
fn test_datagram_is_its_own_session() {
    let (pipeline, rx) = pipeline();

    pipeline.process_datagram(SessionIdentity::client("10.0.0.1"), b"{\"a\":");
    pipeline.process_datagram(SessionIdentity::client("10.0.0.1"), b": 1}");
    pipeline.process_datagram(SessionIdentity::client("10.0.0.1"), b"{\"n\":1}{\"n\":2}");

    let out = received(&rx);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].1, json!({"n": 1}));
    assert_eq!(out[1].1, json!({"n": 2}));
    assert_eq!(pipeline.metrics().snapshot().sessions_active(), 0);
}

#[test]
fn test_reload_applies_to_next_value() {
    let (pipeline, rx) = pipeline();
    let mut session = pipeline.open_session(sensor("abc"));

    pipeline.process(&mut session, b"{\"z\":0}");
    pipeline
        .enrichment()
        .store(EnrichmentDb::from_value(json!({"uuids": {"abc": {"a": 42}}})).unwrap());
    pipeline.process(&mut session, b"{\"z\":1}");

    let out = received(&rx);
    assert_eq!(out[0].1["a"], json!(1));
    assert_eq!(out[1].1["a"], json!(42));
    assert!(out[1].1.get("b").is_none());
}

#[test]
fn test_mse_notifications() {
    let (pipeline, rx) = pipeline();
    let identity = SessionIdentity::sensor("ip", "abc", "rb_loc");

    pipeline.process_mse(
        &identity,
        br#"{"notifications": [
            {"subscriptionName": "rb-assoc", "deviceId": "54:26:96:db:88:01"},
            {"subscriptionName": "other", "deviceId": "54:26:96:db:88:02"}
        ]}"#,
    );

    let out = received(&rx);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].0.topic, "rb_loc");
    assert_eq!(out[0].0.partition_key, Some(0x5426_96db_8801));
    assert_eq!(out[0].1["mse_site"], json!("hq"));
    assert!(out[0].1.get("sensor_uuid").is_none());
    assert_eq!(out[1].1["sensor_uuid"], json!("abc"));
}

#[test]
fn test_mse_invalid_body() {
    let (pipeline, rx) = pipeline();

    pipeline.process_mse(&SessionIdentity::client("ip"), b"not json");

    assert!(rx.is_empty());
    assert_eq!(pipeline.metrics().snapshot().malformed_regions, 1);
}

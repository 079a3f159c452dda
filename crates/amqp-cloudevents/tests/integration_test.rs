// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use amqp_cloudevents::amqp::mock::{Call, MockTransport};
use amqp_cloudevents::amqp::TransportError;
use amqp_cloudevents::{BatchResult, FlushStatus, OutputPlugin};
use common::helpers::{initialized_plugin, message_record, settings, unencodable_record};
use std::collections::HashSet;

#[tokio::test]
async fn test_two_record_batch_end_to_end() {
    let (mut plugin, transport) = initialized_plugin().await;

    let result = plugin
        .flush(
            "app",
            vec![message_record("a", 0), message_record("b", 1)],
        )
        .await;

    assert_eq!(result, BatchResult::from_counts(2, 0));
    assert_eq!(result.status.code(), 1);

    let published = transport.published();
    assert_eq!(published.len(), 2);

    let bodies: Vec<String> = published
        .iter()
        .map(|p| String::from_utf8(p.message.body.clone()).unwrap())
        .collect();
    assert!(bodies[0].contains(r#""data":{"msg":"a"}"#));
    assert!(bodies[1].contains(r#""data":{"msg":"b"}"#));

    for p in &published {
        assert_eq!(p.exchange, "");
        assert_eq!(p.routing_key, "fluent-bit-events");
        assert_eq!(p.message.content_type, "application/json");

        let body = p.body_json();
        assert_eq!(body["specversion"], "1.0");
        assert_eq!(body["source"], "fluent-bit");
        assert_eq!(body["type"], "fluent-bit.log");
        assert_eq!(body["datacontenttype"], "application/json");
        assert_eq!(body["fluentbittag"], "app");

        assert_eq!(p.message.header("ce-specversion"), Some("1.0"));
        assert_eq!(p.message.header("ce-type"), Some("fluent-bit.log"));
        assert_eq!(p.message.header("ce-source"), Some("fluent-bit"));
        assert_eq!(p.message.header("ce-id"), body["id"].as_str());
    }

    assert_eq!(published[0].body_json()["time"], "2024-05-01T12:00:00Z");
    assert_eq!(published[1].body_json()["time"], "2024-05-01T12:00:01Z");
    assert_ne!(
        published[0].body_json()["id"],
        published[1].body_json()["id"]
    );
}

#[tokio::test]
async fn test_partial_failure_counts_and_requests_retry() {
    let (mut plugin, transport) = initialized_plugin().await;
    transport.succeed_next_publish();
    transport.fail_next_publish(TransportError::Other("precondition failed".into()));
    transport.succeed_next_publish();
    transport.fail_next_publish(TransportError::Other("precondition failed".into()));

    let batch = vec![
        message_record("a", 0),
        message_record("b", 1),
        message_record("c", 2),
        message_record("d", 3),
        unencodable_record(),
        message_record("e", 4),
    ];
    let result = plugin.flush("app", batch).await;

    assert_eq!(result.published, 3);
    assert_eq!(result.failed, 3);
    assert_eq!(result.status, FlushStatus::Retry);
    assert_eq!(result.status.code(), 2);

    // The unencodable record never reaches the broker.
    assert_eq!(transport.publish_attempts(), 5);
    let delivered: Vec<_> = transport
        .published()
        .iter()
        .map(|p| p.body_json()["data"]["msg"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(delivered, vec!["a", "c", "e"]);
}

#[tokio::test]
async fn test_closed_connection_reconnects_once_and_delivers() {
    let (mut plugin, transport) = initialized_plugin().await;
    transport.fail_next_publish(TransportError::ConnectionClosed);

    let result = plugin.flush("app", vec![message_record("a", 0)]).await;

    assert_eq!(result, BatchResult::from_counts(1, 0));
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.publish_attempts(), 2);

    // The old session is torn down before the new one is opened.
    let calls = transport.calls();
    let reconnect = calls
        .iter()
        .rposition(|call| matches!(call, Call::Connect(_)))
        .unwrap();
    assert_eq!(
        calls[reconnect - 2..reconnect],
        [Call::CloseChannel, Call::CloseConnection]
    );
}

#[tokio::test]
async fn test_failed_reconnect_fails_record_and_recovers_on_next() {
    let (mut plugin, transport) = initialized_plugin().await;
    transport.fail_next_publish(TransportError::ConnectionClosed);
    transport.fail_next_connect(TransportError::Other("connection refused".into()));

    let result = plugin
        .flush("app", vec![message_record("a", 0), message_record("b", 1)])
        .await;

    assert_eq!(result, BatchResult::from_counts(1, 1));
    assert_eq!(result.status, FlushStatus::Retry);
    assert_eq!(transport.connects(), 3);

    let published = transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].body_json()["data"]["msg"], "b");
}

#[tokio::test]
async fn test_closed_after_reconnect_is_not_retried_again() {
    let (mut plugin, transport) = initialized_plugin().await;
    transport.fail_next_publish(TransportError::ConnectionClosed);
    transport.fail_next_publish(TransportError::ConnectionClosed);

    let result = plugin.flush("app", vec![message_record("a", 0)]).await;

    assert_eq!(result, BatchResult::from_counts(0, 1));
    assert_eq!(transport.connects(), 2);
    assert_eq!(transport.publish_attempts(), 2);
}

#[tokio::test]
async fn test_retry_redelivers_whole_batch() {
    let (mut plugin, transport) = initialized_plugin().await;
    transport.succeed_next_publish();
    transport.fail_next_publish(TransportError::Other("resource locked".into()));

    let batch = vec![message_record("a", 0), message_record("b", 1)];
    let first = plugin.flush("app", batch.clone()).await;
    assert_eq!(first.status, FlushStatus::Retry);

    let second = plugin.flush("app", batch).await;
    assert_eq!(second.status, FlushStatus::Ok);

    // "a" goes out twice: delivery is at-least-once per batch.
    let delivered: Vec<_> = transport
        .published()
        .iter()
        .map(|p| p.body_json()["data"]["msg"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(delivered, vec!["a", "a", "b"]);

    let ids: HashSet<_> = transport
        .published()
        .iter()
        .map(|p| p.body_json()["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_uninitialized_plugin_reports_error() {
    let transport = MockTransport::new();
    let mut plugin = OutputPlugin::new(transport.clone());

    let result = plugin.flush("app", vec![message_record("a", 0)]).await;
    assert_eq!(result.status, FlushStatus::Error);
    assert_eq!(result.status.code(), 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_exchange_and_queue_settings() {
    let transport = MockTransport::new();
    let mut plugin = OutputPlugin::new(transport.clone());
    let status = plugin
        .init(&settings(&[
            ("exchange", "logs"),
            ("routing_key", "edge.app"),
            ("queue", "edge-events"),
            ("durable", "false"),
            ("event_source", "edge-1"),
        ]))
        .await;
    assert_eq!(status, FlushStatus::Ok);

    plugin.flush("", vec![message_record("a", 0)]).await;
    assert_eq!(plugin.exit().await, FlushStatus::Ok);

    let published = transport.published();
    assert_eq!(published[0].exchange, "logs");
    assert_eq!(published[0].routing_key, "edge.app");
    assert_eq!(published[0].body_json()["source"], "edge-1");
    assert!(published[0].body_json().get("fluentbittag").is_none());

    let declared = transport
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::DeclareQueue { queue, options } => Some((queue, options.durable)),
            _ => None,
        })
        .unwrap();
    assert_eq!(declared, ("edge-events".to_string(), false));
    assert_eq!(
        transport.calls()[transport.calls().len() - 2..],
        [Call::CloseChannel, Call::CloseConnection]
    );
}

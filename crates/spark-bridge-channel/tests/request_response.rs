//! MessageChannel 请求/响应契约：精确匹配才结算、超时与拒绝可区分、迟到回复被忽略。

use std::{sync::Arc, time::Duration};

use serde_json::{Value, json};
use spark_bridge_channel::{
    ChannelError, ChannelSettings, CorrelationId, Delivery, IgnoreReason, InboundMessage,
    MessageChannel, PortEnd, PropertyValue, Topic, port_pair,
};
use tracing_test::traced_test;

const PAGE: &str = "vscode-webview://page";
const HOST: &str = "vscode-webview://host";

fn page_channel(end: PortEnd) -> (Arc<MessageChannel>, tokio::sync::mpsc::UnboundedReceiver<InboundMessage>) {
    let PortEnd { port, inbox } = end;
    (
        Arc::new(MessageChannel::new(port, ChannelSettings::new(PAGE, HOST))),
        inbox,
    )
}

fn reply(id: &Value, topic: &str, payload: Value) -> Value {
    json!({"id": id, "message": topic, "payload": payload})
}

#[tokio::test(start_paused = true)]
async fn property_request_resolves_only_on_an_exact_match() {
    let (page_end, mut host_end) = port_pair();
    let (channel, _page_inbox) = page_channel(page_end);

    let request = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.get_property("baseThemeKey").await }
    });

    let posted = host_end.inbox.recv().await.expect("request posted");
    assert_eq!(posted.origin, PAGE);
    assert_eq!(posted.data["message"], json!("getProperty"));
    assert_eq!(posted.data["payload"], json!("baseThemeKey"));
    let id = posted.data["id"].clone();
    assert!(uuid_like(&id));

    let answer = json!({"name": "baseThemeKey", "value": "v1"});
    assert_eq!(
        channel.deliver(InboundMessage::new(
            "https://evil.example",
            reply(&id, "getPropertyResponse", answer.clone())
        )),
        Delivery::Ignored(IgnoreReason::OriginMismatch)
    );
    assert_eq!(
        channel.deliver(InboundMessage::new(
            HOST,
            reply(&json!("someone-else"), "getPropertyResponse", answer.clone())
        )),
        Delivery::Ignored(IgnoreReason::UnknownId)
    );
    assert_eq!(
        channel.deliver(InboundMessage::new(
            HOST,
            reply(&id, "host.getSessionDetailsResponse", answer.clone())
        )),
        Delivery::Ignored(IgnoreReason::TopicMismatch)
    );
    assert_eq!(
        channel.deliver(InboundMessage::new(HOST, json!({"hello": "world"}))),
        Delivery::Ignored(IgnoreReason::Malformed)
    );
    assert_eq!(channel.pending_len(), 1);

    let expected_id = CorrelationId::from(id.as_str().expect("string id"));
    assert_eq!(
        channel.deliver(InboundMessage::new(
            HOST,
            reply(&id, "getPropertyResponse", answer)
        )),
        Delivery::Resolved(expected_id)
    );

    let value = request.await.expect("task").expect("resolved");
    assert_eq!(value, PropertyValue::new("baseThemeKey", "v1"));
    assert_eq!(channel.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn unanswered_request_times_out_and_late_replies_are_ignored() {
    let (page_end, mut host_end) = port_pair();
    let (channel, _page_inbox) = page_channel(page_end);

    let started = tokio::time::Instant::now();
    let err = channel
        .request(Topic::GetProperty, json!("baseThemeKey"))
        .await
        .expect_err("nobody answers");
    assert!(err.is_timeout());
    assert_eq!(err.code(), "spark.bridge.channel.timeout");
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(channel.pending_len(), 0);
    assert!(logs_contain("channel request timed out"));

    let posted = host_end.inbox.recv().await.expect("request was posted");
    assert_eq!(
        channel.deliver(InboundMessage::new(
            HOST,
            reply(
                &posted.data["id"],
                "getPropertyResponse",
                json!({"name": "baseThemeKey", "value": "late"})
            )
        )),
        Delivery::Ignored(IgnoreReason::UnknownId)
    );
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_is_honoured() {
    let (page_end, _host_end) = port_pair();
    let channel = MessageChannel::new(
        page_end.port,
        ChannelSettings::new(PAGE, HOST).with_request_timeout(Duration::from_millis(300)),
    );

    let started = tokio::time::Instant::now();
    let err = channel
        .request(Topic::HostGetLoginOptions, Value::Null)
        .await
        .expect_err("timeout");
    assert!(matches!(
        err,
        ChannelError::Timeout {
            topic: Topic::HostGetLoginOptions,
            after,
            ..
        } if after == Duration::from_millis(300)
    ));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn refusal_is_distinct_from_timeout() {
    let (page_end, host_end) = port_pair();
    let (page, page_inbox) = page_channel(page_end);
    let host = Arc::new(MessageChannel::new(
        host_end.port,
        ChannelSettings::new(HOST, PAGE),
    ));
    host.serve(Topic::HostGetSessionDetails, |_payload: Value| async move {
        Err::<Value, _>(ChannelError::Port {
            reason: "not signed in".to_owned(),
        })
    })
    .expect("request topic");
    let _page_listener = page.spawn_listener(page_inbox).expect("runtime");
    let _host_listener = host.spawn_listener(host_end.inbox).expect("runtime");

    let err = page
        .request(Topic::HostGetSessionDetails, Value::Null)
        .await
        .expect_err("refused");
    let ChannelError::Rejected { topic, reason, .. } = &err else {
        panic!("expected a refusal, got {err:?}");
    };
    assert_eq!(*topic, Topic::HostGetSessionDetails);
    assert!(reason.contains("not signed in"));
    assert_eq!(err.code(), "spark.bridge.channel.rejected");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_correlated_independently() {
    let (page_end, host_end) = port_pair();
    let (page, page_inbox) = page_channel(page_end);
    let host = Arc::new(MessageChannel::new(
        host_end.port,
        ChannelSettings::new(HOST, PAGE),
    ));
    host.serve_properties(|name| Some(Value::from(format!("value-of-{name}"))))
        .expect("getProperty is a request topic");
    let _page_listener = page.spawn_listener(page_inbox).expect("runtime");
    let _host_listener = host.spawn_listener(host_end.inbox).expect("runtime");

    let requests: Vec<_> = (0..32)
        .map(|n| {
            let page = Arc::clone(&page);
            tokio::spawn(async move { page.get_property(&format!("key{n}")).await })
        })
        .collect();
    for (n, request) in requests.into_iter().enumerate() {
        let value = request.await.expect("task").expect("answered");
        assert_eq!(value, PropertyValue::new(format!("key{n}"), format!("value-of-key{n}")));
    }
    assert_eq!(page.pending_len(), 0);
}

#[tokio::test]
async fn close_rejects_pending_and_future_requests() {
    let (page_end, mut host_end) = port_pair();
    let (channel, _page_inbox) = page_channel(page_end);

    let pending = tokio::spawn({
        let channel = Arc::clone(&channel);
        async move { channel.request(Topic::GetProperty, json!("x")).await }
    });
    host_end.inbox.recv().await.expect("request posted");

    channel.close();
    assert!(matches!(
        pending.await.expect("task"),
        Err(ChannelError::Closed)
    ));
    assert!(matches!(
        channel.request(Topic::GetProperty, json!("y")).await,
        Err(ChannelError::Closed)
    ));
    assert_eq!(
        channel.deliver(InboundMessage::new(HOST, json!({}))),
        Delivery::Ignored(IgnoreReason::Closed)
    );
}

#[tokio::test]
async fn response_topics_cannot_be_requested_or_served() {
    let (page_end, _host_end) = port_pair();
    let (channel, _page_inbox) = page_channel(page_end);

    assert!(matches!(
        channel.request(Topic::GetPropertyResponse, Value::Null).await,
        Err(ChannelError::NotARequestTopic { .. })
    ));
    assert!(
        channel
            .serve(Topic::FrameGetLoginOptionsResponse, |payload: Value| async move {
                Ok::<_, ChannelError>(payload)
            })
            .is_err()
    );
}

#[tokio::test]
async fn abandoned_requests_leave_nothing_behind() {
    let (page_end, _host_end) = port_pair();
    let (channel, _page_inbox) = page_channel(page_end);

    let abandoned = channel.request(Topic::GetProperty, json!("theme"));
    tokio::select! {
        _ = abandoned => panic!("nobody answers"),
        _ = tokio::task::yield_now() => {}
    }
    assert_eq!(channel.pending_len(), 0);
}

fn uuid_like(id: &Value) -> bool {
    id.as_str()
        .is_some_and(|s| s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4)
}

//! 进程内传输：状态机与回调时序在真实 Tokio 任务下的表现。

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use spark_bridge_transport::{
    InboundCall, Metadata, ResponseWriter, RpcHandler, SessionState, StreamingInProcessFactory,
    Transport, TransportError, TransportEvent, TransportFactory, TransportOptions,
    UnaryInProcessFactory, async_trait, event_channel,
};
use tokio::sync::Semaphore;

const URL: &str = "https://rpc.example/query.v1.QueryService/Run";

/// 先写头部，再把每条请求原样回写为一个分块。
#[derive(Default)]
struct Echo {
    calls: AtomicUsize,
}

#[async_trait]
impl RpcHandler for Echo {
    async fn handle(
        &self,
        mut call: InboundCall,
        response: ResponseWriter,
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tenant = call.metadata().get("x-tenant").unwrap_or("none").to_owned();
        response.send_headers(200, Metadata::new().with("x-tenant", tenant))?;
        while let Some(message) = call.next_message().await {
            response.send_chunk(message)?;
        }
        Ok(())
    }
}

/// 写完头部后在闸门处等待，再写一个分块。
struct Stalled {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl RpcHandler for Stalled {
    async fn handle(
        &self,
        _call: InboundCall,
        response: ResponseWriter,
    ) -> Result<(), TransportError> {
        response.send_headers(200, Metadata::new())?;
        let _permit = self.gate.acquire().await.map_err(|_| TransportError::Cancelled)?;
        response.send_chunk(Bytes::from_static(b"too late"))?;
        Ok(())
    }
}

/// 不写头部直接失败，模拟连接被拒。
struct Unreachable;

#[async_trait]
impl RpcHandler for Unreachable {
    async fn handle(
        &self,
        call: InboundCall,
        _response: ResponseWriter,
    ) -> Result<(), TransportError> {
        Err(TransportError::ConnectionFailed {
            url: call.url().to_owned(),
            reason: "connection refused".to_owned(),
        })
    }
}

/// 不读请求、不写头部，直接成功。
struct Silent;

#[async_trait]
impl RpcHandler for Silent {
    async fn handle(
        &self,
        _call: InboundCall,
        _response: ResponseWriter,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn streaming_call_delivers_ordered_callbacks() {
    let factory = StreamingInProcessFactory::new(Echo::default());
    let (sink, mut events) = event_channel();
    let mut transport = factory
        .create(TransportOptions::new(URL, sink).with_debug(true))
        .expect("create");
    assert_eq!(transport.state(), SessionState::Created);

    transport
        .start(Metadata::new().with("X-Tenant", "acme"))
        .expect("start");
    for part in ["a", "b", "c"] {
        transport
            .send_message(Bytes::from_static(part.as_bytes()))
            .expect("streaming send");
    }
    transport.finish_send().expect("finish");
    assert_eq!(transport.state(), SessionState::HalfClosed);

    let Some(TransportEvent::Headers(headers)) = events.next().await else {
        panic!("headers must come first");
    };
    assert_eq!(headers.status(), 200);
    assert_eq!(headers.metadata().get("x-tenant"), Some("acme"));

    let mut chunks = Vec::new();
    loop {
        match events.next().await {
            Some(TransportEvent::Chunk(chunk)) => chunks.push(chunk),
            Some(TransportEvent::End(error)) => {
                assert_eq!(error, None);
                break;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(chunks, vec!["a", "b", "c"]);
    assert_eq!(transport.state(), SessionState::Ended);
}

#[tokio::test]
async fn unary_transport_rejects_a_second_send() {
    let factory = UnaryInProcessFactory::new(Echo::default());
    assert!(!UnaryInProcessFactory::<Echo>::SUPPORTS_CLIENT_STREAMING);
    let (sink, events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");

    transport.start(Metadata::new()).expect("start");
    transport
        .send_message(Bytes::from_static(b"only"))
        .expect("first send");
    let err = transport
        .send_message(Bytes::from_static(b"again"))
        .expect_err("second send must be rejected");
    assert_eq!(err, TransportError::ClientStreamingUnsupported);
    assert_eq!(err.code(), "spark.bridge.transport.client_streaming_unsupported");

    transport.finish_send().expect("finish");
    let outcome = events.collect(URL).await.expect("call succeeds");
    assert_eq!(outcome.chunks(), [Bytes::from_static(b"only")]);
}

#[tokio::test]
async fn streaming_transport_accepts_many_sends() {
    let factory = StreamingInProcessFactory::new(Echo::default());
    let (sink, events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");

    transport.start(Metadata::new()).expect("start");
    for n in 0..256u16 {
        transport
            .send_message(Bytes::from(n.to_be_bytes().to_vec()))
            .expect("streaming send");
    }
    transport.finish_send().expect("finish");

    let outcome = events.collect(URL).await.expect("call succeeds");
    assert_eq!(outcome.chunks().len(), 256);
    assert_eq!(&outcome.chunks()[255][..], 255u16.to_be_bytes());
}

#[test]
fn start_outside_a_runtime_is_rejected() {
    let factory = StreamingInProcessFactory::new(Echo::default());
    let (sink, _events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");

    assert_eq!(
        transport.start(Metadata::new()),
        Err(TransportError::RuntimeUnavailable)
    );
    assert_eq!(transport.state(), SessionState::Created);
}

#[tokio::test]
async fn operations_in_the_wrong_state_are_rejected() {
    let factory = StreamingInProcessFactory::new(Echo::default());
    let (sink, _events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");

    assert!(matches!(
        transport.send_message(Bytes::from_static(b"early")),
        Err(TransportError::InvalidState {
            state: SessionState::Created,
            ..
        })
    ));
    assert!(transport.finish_send().is_err());
    transport.start(Metadata::new()).expect("start");
    assert!(transport.start(Metadata::new()).is_err());
}

#[tokio::test]
async fn cancel_silences_every_later_callback() {
    let gate = Arc::new(Semaphore::new(0));
    let factory = StreamingInProcessFactory::new(Stalled {
        gate: Arc::clone(&gate),
    });
    let (sink, mut events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");

    transport.start(Metadata::new()).expect("start");
    transport.finish_send().expect("finish");
    assert!(matches!(events.next().await, Some(TransportEvent::Headers(_))));

    transport.cancel();
    assert_eq!(transport.state(), SessionState::Cancelled);
    transport.cancel();
    assert_eq!(transport.state(), SessionState::Cancelled);
    gate.add_permits(1);
    tokio::task::yield_now().await;

    drop(transport);
    assert_eq!(events.next().await, None, "no callback may follow cancel");
}

#[tokio::test]
async fn dropping_an_unfinished_call_cancels_it() {
    let gate = Arc::new(Semaphore::new(0));
    let factory = StreamingInProcessFactory::new(Stalled {
        gate: Arc::clone(&gate),
    });
    let (sink, events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");
    transport.start(Metadata::new()).expect("start");

    drop(transport);
    gate.add_permits(1);
    assert_eq!(events.collect(URL).await, Err(TransportError::Cancelled));
}

#[tokio::test]
async fn failure_before_headers_reports_status_zero() {
    let factory = UnaryInProcessFactory::new(Unreachable);
    let (sink, mut events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");
    transport.start(Metadata::new()).expect("start");

    let Some(TransportEvent::Headers(headers)) = events.next().await else {
        panic!("headers must still be delivered exactly once");
    };
    assert!(headers.is_connection_failure());
    let Some(TransportEvent::End(Some(error))) = events.next().await else {
        panic!("end must carry the handler error");
    };
    assert_eq!(error.code(), "spark.bridge.transport.connection_failed");
    assert!(error.is_connection_error());
    assert_eq!(transport.state(), SessionState::Ended);
}

#[tokio::test]
async fn success_without_headers_defaults_to_ok() {
    let factory = UnaryInProcessFactory::new(Silent);
    let (sink, events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(URL, sink)).expect("create");
    transport.start(Metadata::new()).expect("start");

    let outcome = events.collect(URL).await.expect("silent success");
    assert_eq!(outcome.headers().status(), 200);
    assert!(outcome.chunks().is_empty());
}

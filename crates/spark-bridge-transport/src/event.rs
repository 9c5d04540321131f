//! # 事件流适配器
//!
//! 把回调接口转成带标签的事件序列，便于以 `async` 代码顺序消费一次调用的响应。
//! 事件顺序与回调顺序一致，因此头部/分块/结束的时序约束原样保留。

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{
    error::TransportError,
    options::{ResponseHeaders, TransportCallbacks},
};

/// 单个回调对应的事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Headers(ResponseHeaders),
    Chunk(Bytes),
    End(Option<TransportError>),
}

/// 创建一对回调汇与事件流。
pub fn event_channel() -> (Arc<EventSink>, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(EventSink { tx }), EventStream { rx })
}

/// 把回调转发为 [`TransportEvent`] 的 [`TransportCallbacks`] 实现。
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    fn forward(&self, event: TransportEvent) {
        // 接收端已放弃时事件无人消费，直接丢弃。
        let _ = self.tx.send(event);
    }
}

impl TransportCallbacks for EventSink {
    fn on_headers(&self, headers: ResponseHeaders) {
        self.forward(TransportEvent::Headers(headers));
    }

    fn on_chunk(&self, chunk: Bytes) {
        self.forward(TransportEvent::Chunk(chunk));
    }

    fn on_end(&self, error: Option<TransportError>) {
        self.forward(TransportEvent::End(error));
    }
}

/// 一次调用的事件序列。
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventStream {
    /// 下一个事件；所有发送端释放后返回 `None`。
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// 消费到 `on_end` 为止，汇总为 [`CallOutcome`]。
    ///
    /// # 教案式注释
    /// - **契约 (What)**：
    ///   - `on_end` 携带错误时原样返回该错误；
    ///   - 头部状态为 0 且未携带错误时返回 [`TransportError::ConnectionFailed`]；
    ///   - 回调汇在 `on_end` 之前被释放（调用被取消）时返回 [`TransportError::Cancelled`]；
    /// - **前置条件**：调用方需在等待期间持有传输句柄，否则句柄被丢弃会触发取消。
    pub async fn collect(mut self, url: &str) -> Result<CallOutcome, TransportError> {
        let mut headers = None;
        let mut chunks = Vec::new();
        let end = loop {
            match self.next().await {
                Some(TransportEvent::Headers(received)) => headers = Some(received),
                Some(TransportEvent::Chunk(chunk)) => chunks.push(chunk),
                Some(TransportEvent::End(error)) => break error,
                None => return Err(TransportError::Cancelled),
            }
        };
        if let Some(error) = end {
            return Err(error);
        }
        let headers = headers.unwrap_or_else(ResponseHeaders::connection_failure);
        if headers.is_connection_failure() {
            return Err(TransportError::ConnectionFailed {
                url: url.to_owned(),
                reason: "no response received (status 0)".to_owned(),
            });
        }
        Ok(CallOutcome { headers, chunks })
    }
}

/// 一次成功调用的完整响应。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    headers: ResponseHeaders,
    chunks: Vec<Bytes>,
}

impl CallOutcome {
    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }

    /// 所有分块按顺序拼接。
    pub fn body(&self) -> Bytes {
        self.chunks.concat().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_gathers_chunks_in_order() {
        let (sink, events) = event_channel();
        sink.on_headers(ResponseHeaders::ok());
        sink.on_chunk(Bytes::from_static(b"ab"));
        sink.on_chunk(Bytes::from_static(b"cd"));
        sink.on_end(None);

        let outcome = events.collect("https://rpc.example").await.expect("ok");
        assert_eq!(outcome.headers().status(), 200);
        assert_eq!(outcome.chunks().len(), 2);
        assert_eq!(outcome.body(), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn status_zero_without_error_is_a_connection_failure() {
        let (sink, events) = event_channel();
        sink.on_headers(ResponseHeaders::connection_failure());
        sink.on_end(None);

        let err = events.collect("https://rpc.example").await.expect_err("status 0");
        assert_eq!(err.code(), "spark.bridge.transport.connection_failed");
    }

    #[tokio::test]
    async fn sink_dropped_before_end_reads_as_cancelled() {
        let (sink, events) = event_channel();
        sink.on_headers(ResponseHeaders::ok());
        drop(sink);
        assert_eq!(
            events.collect("https://rpc.example").await,
            Err(TransportError::Cancelled)
        );
    }
}

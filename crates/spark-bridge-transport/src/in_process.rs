//! # 进程内传输
//!
//! ## 定位（Why）
//! - 为测试与嵌入式场景提供一个无需网络的参考实现：请求消息经 Tokio 通道交给
//!   [`RpcHandler`]，响应经 [`CallbackSequencer`] 回调给调用方；
//! - 也用来演示一个传输实现如何同时满足状态机与回调时序两份契约。
//!
//! ## 行为（How）
//! - `start` 在当前 Tokio 运行时上派生处理任务；无运行时返回 [`TransportError::RuntimeUnavailable`]；
//! - 处理方成功返回但未写头部时补发状态 200；在写头部前失败时，时序守卫补发状态 0 再投递错误；
//! - `cancel` 先静默回调，再中止处理任务；句柄被丢弃且调用未终止时同样取消。

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::{
    error::TransportError,
    options::{Metadata, ResponseHeaders, TransportOptions},
    sequencer::CallbackSequencer,
    session::{SessionState, SessionStateMachine},
    transport::{Transport, TransportFactory},
};

/// 进程内调用的服务端处理逻辑。
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// 处理一次调用；返回错误会作为 `on_end` 的错误交付。
    async fn handle(
        &self,
        call: InboundCall,
        response: ResponseWriter,
    ) -> Result<(), TransportError>;
}

/// 服务端视角的一次入站调用。
#[derive(Debug)]
pub struct InboundCall {
    url: Arc<str>,
    metadata: Metadata,
    requests: mpsc::UnboundedReceiver<Bytes>,
}

impl InboundCall {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// 下一条请求消息；客户端半关闭后返回 `None`。
    pub async fn next_message(&mut self) -> Option<Bytes> {
        self.requests.recv().await
    }
}

/// 服务端写响应的句柄。
#[derive(Clone, Debug)]
pub struct ResponseWriter {
    sequencer: Arc<CallbackSequencer>,
}

impl ResponseWriter {
    /// 写响应头；只能写一次且必须先于分块。
    pub fn send_headers(&self, status: u16, metadata: Metadata) -> Result<(), TransportError> {
        self.sequencer
            .deliver_headers(ResponseHeaders::new(status, metadata))
    }

    /// 写一个响应分块。
    pub fn send_chunk(&self, chunk: impl Into<Bytes>) -> Result<(), TransportError> {
        self.sequencer.deliver_chunk(chunk.into())
    }

    pub fn headers_sent(&self) -> bool {
        self.sequencer.headers_delivered()
    }

    /// 调用方是否已取消。
    pub fn is_cancelled(&self) -> bool {
        self.sequencer.is_cancelled()
    }
}

/// 以 [`RpcHandler`] 应答的传输工厂；`STREAMING` 决定是否支持客户端流。
pub struct InProcessTransportFactory<H, const STREAMING: bool> {
    handler: Arc<H>,
}

/// 支持客户端流的进程内工厂。
pub type StreamingInProcessFactory<H> = InProcessTransportFactory<H, true>;
/// 每次调用只发送一条消息的进程内工厂。
pub type UnaryInProcessFactory<H> = InProcessTransportFactory<H, false>;

impl<H, const STREAMING: bool> InProcessTransportFactory<H, STREAMING>
where
    H: RpcHandler,
{
    pub fn new(handler: H) -> Self {
        Self::from_shared(Arc::new(handler))
    }

    /// 与其他工厂共享同一个处理方。
    pub fn from_shared(handler: Arc<H>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

impl<H, const STREAMING: bool> Clone for InProcessTransportFactory<H, STREAMING> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H, const STREAMING: bool> fmt::Debug for InProcessTransportFactory<H, STREAMING> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTransportFactory")
            .field("streaming", &STREAMING)
            .finish_non_exhaustive()
    }
}

impl<H, const STREAMING: bool> TransportFactory for InProcessTransportFactory<H, STREAMING>
where
    H: RpcHandler,
{
    type Transport = InProcessTransport<H>;

    const SUPPORTS_CLIENT_STREAMING: bool = STREAMING;

    fn create(&self, options: TransportOptions) -> Result<Self::Transport, TransportError> {
        let (url, debug, callbacks) = options.into_parts();
        debug!(url = %url, streaming = STREAMING, "in-process transport created");
        Ok(InProcessTransport {
            sequencer: Arc::new(CallbackSequencer::new(Arc::clone(&url), debug, callbacks)),
            session: Arc::new(Mutex::new(SessionStateMachine::new(STREAMING))),
            handler: Arc::clone(&self.handler),
            url,
            requests: None,
            task: None,
        })
    }
}

/// 进程内调用句柄。
pub struct InProcessTransport<H> {
    url: Arc<str>,
    handler: Arc<H>,
    sequencer: Arc<CallbackSequencer>,
    session: Arc<Mutex<SessionStateMachine>>,
    requests: Option<mpsc::UnboundedSender<Bytes>>,
    task: Option<JoinHandle<()>>,
}

impl<H> InProcessTransport<H>
where
    H: RpcHandler,
{
    fn spawn_handler(
        &self,
        runtime: tokio::runtime::Handle,
        call: InboundCall,
    ) -> JoinHandle<()> {
        let handler = Arc::clone(&self.handler);
        let sequencer = Arc::clone(&self.sequencer);
        let session = Arc::clone(&self.session);
        let url = Arc::clone(&self.url);
        runtime.spawn(async move {
            let writer = ResponseWriter {
                sequencer: Arc::clone(&sequencer),
            };
            let result = handler.handle(call, writer).await;
            if result.is_ok() && !sequencer.headers_delivered() {
                let _ = sequencer.deliver_headers(ResponseHeaders::ok());
            }
            // 先迁移状态再投递 on_end，回调内观察到的状态已是 Ended。
            let ended = session.lock().end();
            if ended {
                debug!(url = %url, failed = result.is_err(), "in-process call ended");
                let _ = sequencer.deliver_end(result.err());
            }
        })
    }
}

impl<H> Transport for InProcessTransport<H>
where
    H: RpcHandler,
{
    fn start(&mut self, metadata: Metadata) -> Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::RuntimeUnavailable)?;
        self.session.lock().start()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let call = InboundCall {
            url: Arc::clone(&self.url),
            metadata,
            requests: rx,
        };
        self.requests = Some(tx);
        self.task = Some(self.spawn_handler(runtime, call));
        debug!(url = %self.url, "in-process call started");
        Ok(())
    }

    fn send_message(&mut self, message: Bytes) -> Result<(), TransportError> {
        self.session.lock().send()?;
        if let Some(requests) = &self.requests {
            if requests.send(message).is_err() {
                debug!(url = %self.url, "handler stopped reading; request message dropped");
            }
        }
        Ok(())
    }

    fn finish_send(&mut self) -> Result<(), TransportError> {
        self.session.lock().finish_send()?;
        self.requests = None;
        Ok(())
    }

    fn cancel(&mut self) {
        if !self.session.lock().cancel() {
            return;
        }
        self.sequencer.cancel();
        self.requests = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!(url = %self.url, "in-process call cancelled");
    }

    fn state(&self) -> SessionState {
        self.session.lock().state()
    }
}

impl<H> Drop for InProcessTransport<H> {
    fn drop(&mut self) {
        if self.session.lock().cancel() {
            self.sequencer.cancel();
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

impl<H> fmt::Debug for InProcessTransport<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTransport")
            .field("url", &self.url)
            .field("state", &self.session.lock().state())
            .finish_non_exhaustive()
    }
}

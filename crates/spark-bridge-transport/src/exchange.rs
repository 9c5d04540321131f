//! # 交换驱动
//!
//! 把“发送一组消息并收齐响应”落到具体的传输能力上：
//! - 支持客户端流：一次调用发送全部消息，返回一个 [`CallOutcome`]；
//! - 不支持：每条消息单独一次调用，按顺序执行，返回与消息一一对应的结果。
//!
//! 任一调用失败立即返回该错误，不做重试。

use bytes::Bytes;
use tracing::debug;

use crate::{
    error::TransportError,
    event::{CallOutcome, event_channel},
    options::{Metadata, TransportOptions},
    session::SessionState,
    transport::{Transport, TransportFactory},
};

/// 一次交换的输入。
#[derive(Clone, Debug, Default)]
pub struct Exchange {
    metadata: Metadata,
    messages: Vec<Bytes>,
    debug: bool,
}

impl Exchange {
    pub fn new(messages: impl IntoIterator<Item = impl Into<Bytes>>) -> Self {
        Self {
            metadata: Metadata::new(),
            messages: messages.into_iter().map(Into::into).collect(),
            debug: false,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn messages(&self) -> &[Bytes] {
        &self.messages
    }
}

/// 在 `factory` 上执行一次交换。
pub async fn run_exchange<F>(
    factory: &F,
    url: &str,
    exchange: Exchange,
) -> Result<Vec<CallOutcome>, TransportError>
where
    F: TransportFactory,
{
    let Exchange {
        metadata,
        messages,
        debug,
    } = exchange;
    debug!(
        url,
        messages = messages.len(),
        streaming = F::SUPPORTS_CLIENT_STREAMING,
        "running exchange"
    );

    if F::SUPPORTS_CLIENT_STREAMING {
        let outcome = run_call(factory, url, &metadata, messages, debug).await?;
        return Ok(vec![outcome]);
    }

    let mut outcomes = Vec::with_capacity(messages.len());
    for message in messages {
        outcomes.push(run_call(factory, url, &metadata, vec![message], debug).await?);
    }
    Ok(outcomes)
}

async fn run_call<F>(
    factory: &F,
    url: &str,
    metadata: &Metadata,
    messages: Vec<Bytes>,
    debug: bool,
) -> Result<CallOutcome, TransportError>
where
    F: TransportFactory,
{
    let (sink, events) = event_channel();
    let mut transport = factory.create(TransportOptions::new(url, sink).with_debug(debug))?;
    transport.start(metadata.clone())?;

    for message in messages {
        if !sending(transport.send_message(message))? {
            break;
        }
    }
    sending(transport.finish_send())?;

    // 句柄须存活到 on_end，提前丢弃会取消调用。
    let outcome = events.collect(url).await;
    drop(transport);
    outcome
}

/// 对端已提前结束时停止发送，转而收取响应；其余错误原样返回。
fn sending(result: Result<(), TransportError>) -> Result<bool, TransportError> {
    match result {
        Ok(()) => Ok(true),
        Err(TransportError::InvalidState {
            state: SessionState::Ended,
            ..
        }) => Ok(false),
        Err(err) => Err(err),
    }
}

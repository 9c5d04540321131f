//! # MessageChannel：带关联 ID、来源校验与超时的请求/响应协议
//!
//! ## 意图（Why）
//! - 页面、嵌入帧与宿主之间只有单向的 post 原语，请求与回复需要自行配对；
//! - 任何来源都可能向页面投递消息，必须只接受期望来源、期望主题、期望 ID 三者同时匹配的回复。
//!
//! ## 契约（What）
//! - `request`：生成 UUID v4 关联 ID → 登记待决请求 → 以本端来源投递 → 在超时内等待；
//!   合法回复到达即结算并移除，超时则以 [`ChannelError::Timeout`] 结算并移除，迟到的回复被忽略；
//! - `deliver`：单一入口检查每条入站消息，其余一律静默忽略（`trace` 级日志）；
//! - `serve`：注册请求主题的处理方，应答以配对的响应主题和同一 ID 回写，失败时携带 `error` 字段。
//!
//! ## 并发（How）
//! - 待决表为 `parking_lot::Mutex<HashMap>`，结算（移除 + 发送）在同一临界区内完成，
//!   超时分支因此只需在锁内再检查一次即可判定“超时”还是“刚好已结算”；
//! - 任何锁都不会跨越 `.await`；处理方在独立任务中运行，监听循环不会被慢处理方阻塞。

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use crate::{
    envelope::{CorrelationId, Envelope, InboundMessage},
    error::ChannelError,
    port::MessagePort,
    settings::ChannelSettings,
    topic::Topic,
};

/// 请求主题的应答方。
///
/// 返回错误时，对端收到带 `error` 字段的拒绝响应，文案为错误的 `Display`。
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, payload: Value) -> Result<Value, ChannelError>;
}

#[async_trait]
impl<F, Fut> RequestHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ChannelError>> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> Result<Value, ChannelError> {
        (self)(payload).await
    }
}

/// 入站消息被忽略的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 来源与期望来源不完全相等。
    OriginMismatch,
    /// 不是合法的信封（含未知主题）。
    Malformed,
    /// 没有该 ID 的待决请求（从未发出、已结算或已超时）。
    UnknownId,
    /// ID 匹配但主题不是该请求的响应主题。
    TopicMismatch,
    /// 请求主题没有注册处理方。
    NoHandler,
    /// 通道已关闭。
    Closed,
    /// 无运行时可执行处理方。
    NoRuntime,
}

/// 一条入站消息的处理结果。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// 结算了对应的待决请求。
    Resolved(CorrelationId),
    /// 交给了请求处理方。
    Dispatched(Topic),
    Ignored(IgnoreReason),
}

type Reply = Result<Value, ChannelError>;

struct PendingRequest {
    topic: Topic,
    response_topic: Topic,
    reply: oneshot::Sender<Reply>,
}

type PendingTable = Mutex<HashMap<CorrelationId, PendingRequest>>;

/// 请求 Future 被丢弃时移除待决条目。
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// 请求/响应通道。
///
/// # 教案级注释
/// - **所有权 (What)**：待决表与处理方注册表均为私有结构，只能经由本类型的方法修改；
/// - **生命周期**：监听循环由 [`MessageChannel::spawn_listener`] 创建，丢弃 [`ListenerHandle`]
///   即停止；[`MessageChannel::close`] 以 [`ChannelError::Closed`] 结算全部待决请求。
pub struct MessageChannel {
    port: Arc<dyn MessagePort>,
    settings: ChannelSettings,
    pending: PendingTable,
    handlers: RwLock<HashMap<Topic, Arc<dyn RequestHandler>>>,
    closed: AtomicBool,
}

impl MessageChannel {
    pub fn new(port: impl MessagePort, settings: ChannelSettings) -> Self {
        Self {
            port: Arc::new(port),
            settings,
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// 发送请求并等待配对的回复。
    ///
    /// # 教案式注释
    /// - **前置条件**：`topic` 必须是请求主题，否则返回 [`ChannelError::NotARequestTopic`]；
    /// - **后置条件**：无论结果如何（回复、拒绝、超时、调用方放弃等待），待决条目都已移除；
    /// - **错误**：超时 → `Timeout`；对端拒绝 → `Rejected`；通道关闭 → `Closed`；
    ///   投递失败 → `Port`。
    pub async fn request(&self, topic: Topic, payload: Value) -> Result<Value, ChannelError> {
        let response_topic = topic
            .response_topic()
            .ok_or(ChannelError::NotARequestTopic { topic })?;
        let id = CorrelationId::generate();
        let (reply, mut receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            // 在锁内检查，保证与 close() 的清空互斥。
            if self.is_closed() {
                return Err(ChannelError::Closed);
            }
            pending.insert(
                id.clone(),
                PendingRequest {
                    topic,
                    response_topic,
                    reply,
                },
            );
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        post_envelope(
            self.port.as_ref(),
            &Envelope::new(id.clone(), topic, payload),
            self.settings.local_origin(),
        )?;
        debug!(topic = %topic, id = %id, "channel request posted");

        let timeout = self.settings.request_timeout();
        match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                if self.pending.lock().remove(&id).is_some() {
                    debug!(topic = %topic, id = %id, ?timeout, "channel request timed out");
                    return Err(ChannelError::Timeout {
                        topic,
                        id,
                        after: timeout,
                    });
                }
                // 截止时刻与结算同时发生：结算方已在锁内发送了回复。
                receiver.try_recv().unwrap_or(Err(ChannelError::Closed))
            }
        }
    }

    /// 为请求主题注册处理方，替换已有的处理方。
    pub fn serve(&self, topic: Topic, handler: impl RequestHandler) -> Result<(), ChannelError> {
        if !topic.is_request() {
            return Err(ChannelError::NotARequestTopic { topic });
        }
        let replaced = self
            .handlers
            .write()
            .insert(topic, Arc::new(handler))
            .is_some();
        debug!(topic = %topic, replaced, "channel handler registered");
        Ok(())
    }

    /// 处理一条入站消息。
    pub fn deliver(&self, inbound: InboundMessage) -> Delivery {
        if self.is_closed() {
            trace!(origin = %inbound.origin, "message ignored: channel closed");
            return Delivery::Ignored(IgnoreReason::Closed);
        }
        if inbound.origin != self.settings.expected_origin() {
            trace!(
                origin = %inbound.origin,
                expected = self.settings.expected_origin(),
                "message ignored: unexpected origin"
            );
            return Delivery::Ignored(IgnoreReason::OriginMismatch);
        }
        let envelope: Envelope = match serde_json::from_value(inbound.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                trace!(error = %err, "message ignored: not an envelope");
                return Delivery::Ignored(IgnoreReason::Malformed);
            }
        };
        if envelope.message.is_request() {
            self.dispatch(envelope)
        } else {
            self.settle(envelope)
        }
    }

    fn settle(&self, envelope: Envelope) -> Delivery {
        let Envelope {
            id,
            message,
            payload,
            error,
        } = envelope;

        let mut pending = self.pending.lock();
        match pending.get(&id) {
            None => {
                trace!(id = %id, topic = %message, "message ignored: no pending request");
                return Delivery::Ignored(IgnoreReason::UnknownId);
            }
            Some(request) if request.response_topic != message => {
                trace!(
                    id = %id,
                    topic = %message,
                    expected = %request.response_topic,
                    "message ignored: unexpected response topic"
                );
                return Delivery::Ignored(IgnoreReason::TopicMismatch);
            }
            Some(_) => {}
        }
        let Some(request) = pending.remove(&id) else {
            return Delivery::Ignored(IgnoreReason::UnknownId);
        };
        let reply = match error {
            Some(reason) => Err(ChannelError::Rejected {
                topic: request.topic,
                id: id.clone(),
                reason,
            }),
            None => Ok(payload),
        };
        // 请求方可能已放弃等待。
        let _ = request.reply.send(reply);
        drop(pending);

        debug!(id = %id, topic = %request.topic, "channel request settled");
        Delivery::Resolved(id)
    }

    fn dispatch(&self, envelope: Envelope) -> Delivery {
        let topic = envelope.message;
        let Some(handler) = self.handlers.read().get(&topic).cloned() else {
            trace!(id = %envelope.id, topic = %topic, "message ignored: no handler");
            return Delivery::Ignored(IgnoreReason::NoHandler);
        };
        let Some(response_topic) = topic.response_topic() else {
            return Delivery::Ignored(IgnoreReason::NoHandler);
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(id = %envelope.id, topic = %topic, "request dropped: no runtime to run the handler");
            return Delivery::Ignored(IgnoreReason::NoRuntime);
        };

        let port = Arc::clone(&self.port);
        let origin = self.settings.local_origin().to_owned();
        let Envelope { id, payload, .. } = envelope;
        runtime.spawn(async move {
            let response = match handler.handle(payload).await {
                Ok(payload) => Envelope::new(id, response_topic, payload),
                Err(err) => {
                    debug!(id = %id, topic = %topic, code = err.code(), error = %err, "request refused");
                    Envelope::refusal(id, response_topic, err.to_string())
                }
            };
            if let Err(err) = post_envelope(port.as_ref(), &response, &origin) {
                warn!(
                    id = %response.id,
                    topic = %response_topic,
                    error = %err,
                    "failed to post response"
                );
            }
        });
        Delivery::Dispatched(topic)
    }

    /// 在当前运行时上派生监听循环，把 `inbox` 中的每条消息交给 [`MessageChannel::deliver`]。
    ///
    /// 监听循环只持有通道的弱引用，通道释放后循环随之结束。
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
    ) -> Result<ListenerHandle, ChannelError> {
        let runtime = Handle::try_current().map_err(|_| ChannelError::RuntimeUnavailable)?;
        let channel = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            while let Some(message) = inbox.recv().await {
                let Some(channel) = channel.upgrade() else {
                    break;
                };
                channel.deliver(message);
            }
            trace!("channel listener stopped");
        });
        Ok(ListenerHandle { task })
    }

    /// 关闭通道：以 [`ChannelError::Closed`] 结算全部待决请求，此后的请求与入站消息均被拒绝。
    pub fn close(&self) {
        let mut pending = self.pending.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let rejected = pending.len();
        for (_, request) in pending.drain() {
            let _ = request.reply.send(Err(ChannelError::Closed));
        }
        drop(pending);
        self.handlers.write().clear();
        debug!(rejected, "message channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 当前待决请求数。
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageChannel")
            .field("settings", &self.settings)
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn post_envelope(
    port: &dyn MessagePort,
    envelope: &Envelope,
    origin: &str,
) -> Result<(), ChannelError> {
    let message = serde_json::to_value(envelope).map_err(|source| ChannelError::Payload {
        topic: envelope.message,
        source,
    })?;
    port.post(message, origin)
}

/// 监听循环句柄；丢弃即停止监听。
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// 立即停止监听。
    pub fn shutdown(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

//! 传输契约：一次流式 RPC 调用及其工厂。

use bytes::Bytes;

use crate::{
    error::TransportError,
    options::{Metadata, TransportOptions},
    session::SessionState,
};

/// 一次流式 RPC 调用的客户端句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 上层（服务句柄、交换驱动）只面对“开始、发送、半关闭、取消”四个动作，
///   不关心底层是 HTTP 流、进程内任务还是测试桩；
///
/// ## 契约（What）
/// - `start`：`Created → Started`，携带请求元数据；
/// - `send_message`：`Started|Sending → Sending`；非流式传输第二次调用返回
///   [`TransportError::ClientStreamingUnsupported`]；
/// - `finish_send`：`Started|Sending → HalfClosed`，此后只等待对端流式返回；
/// - `cancel`：任意非终止状态强制进入 `Cancelled`，此后不再触发任何回调（包括 `on_end`）；
///   重复取消为无操作；
/// - 状态不符时返回 [`TransportError::InvalidState`]，状态保持不变；
/// - 响应经创建时传入的 [`TransportCallbacks`](crate::TransportCallbacks) 投递，时序由
///   [`CallbackSequencer`](crate::CallbackSequencer) 保证。
///
/// ## 风险提示（Trade-offs）
/// - 丢弃一个未终止的句柄等价于取消；需要等待结果的调用方必须持有句柄直到 `on_end`。
pub trait Transport: Send + 'static {
    fn start(&mut self, metadata: Metadata) -> Result<(), TransportError>;

    fn send_message(&mut self, message: Bytes) -> Result<(), TransportError>;

    fn finish_send(&mut self) -> Result<(), TransportError>;

    fn cancel(&mut self);

    fn state(&self) -> SessionState;
}

/// 打开新调用的工厂。
///
/// - `SUPPORTS_CLIENT_STREAMING` 为静态能力标志：`true` 表示一次调用可发送多条消息，
///   `false` 表示每次调用只发送一条，多消息交换由 [`run_exchange`](crate::run_exchange)
///   以“一条消息一次调用”模拟。
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    const SUPPORTS_CLIENT_STREAMING: bool;

    fn create(&self, options: TransportOptions) -> Result<Self::Transport, TransportError>;
}

#![deny(unsafe_code)]
#![doc = "spark-bridge-transport: 流式 RPC 调用的传输抽象。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：服务句柄需要在不同环境下建立流式调用（浏览器 HTTP 流、进程内任务），上层不应感知差异。"]
#![doc = "- **What**：[`Transport`]/[`TransportFactory`] 契约、会话状态机、回调时序守卫、事件流适配器、进程内实现与交换驱动。"]
#![doc = "- **How**：客户端操作由 [`SessionStateMachine`] 校验，响应回调统一经 [`CallbackSequencer`] 串行投递。"]

mod error;
mod event;
mod exchange;
mod in_process;
mod options;
mod sequencer;
mod session;
mod transport;

pub use error::TransportError;
pub use event::{CallOutcome, EventSink, EventStream, TransportEvent, event_channel};
pub use exchange::{Exchange, run_exchange};
pub use in_process::{
    InProcessTransport, InProcessTransportFactory, InboundCall, ResponseWriter, RpcHandler,
    StreamingInProcessFactory, UnaryInProcessFactory,
};
pub use options::{Metadata, ResponseHeaders, TransportCallbacks, TransportOptions};
pub use sequencer::CallbackSequencer;
pub use session::{SessionState, SessionStateMachine};
pub use transport::{Transport, TransportFactory};

/// 供 [`RpcHandler`] 实现方使用的 `async_trait` 重导出。
pub use async_trait::async_trait;

#![deny(unsafe_code)]
#![doc = "spark-bridge-channel: 跨上下文的请求/响应消息协议。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：嵌入的界面片段需要向宿主查询属性、登录选项与会话信息，而双方之间只有 post 式消息原语。"]
#![doc = "- **What**：封闭主题集合 [`Topic`]、线上信封 [`Envelope`]、端口抽象 [`MessagePort`] 与通道 [`MessageChannel`]。"]
#![doc = "- **How**：关联 ID 为 UUID v4，回复须同时匹配来源、响应主题与 ID；每个待决请求恰有一个超时。"]

mod channel;
mod envelope;
mod error;
mod port;
mod property;
mod relay;
mod settings;
mod topic;

pub use channel::{Delivery, IgnoreReason, ListenerHandle, MessageChannel, RequestHandler};
pub use envelope::{CorrelationId, Envelope, InboundMessage};
pub use error::ChannelError;
pub use port::{MessagePort, MpscPort, PortEnd, port_pair};
pub use property::PropertyValue;
pub use relay::FrameRelay;
pub use settings::ChannelSettings;
pub use topic::Topic;

/// 供 [`RequestHandler`] 实现方使用的 `async_trait` 重导出。
pub use async_trait::async_trait;

//! 投递原语：`post(message, origin)`。

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{envelope::InboundMessage, error::ChannelError};

/// 单向的 post 式消息原语。
///
/// # 教案级注释
/// - **意图 (Why)**：页面、嵌入帧与宿主之间只有“投递一条带来源的消息”这一种能力，
///   通道在它之上实现请求/响应；
/// - **契约 (What)**：`origin` 为发送方声明的来源，接收方据此做精确匹配校验；
///   投递失败返回 [`ChannelError::Port`]；
/// - **前置条件**：实现必须非阻塞，通道会在持有内部锁之外、同步上下文中调用它。
pub trait MessagePort: Send + Sync + 'static {
    fn post(&self, message: Value, origin: &str) -> Result<(), ChannelError>;
}

/// 基于 Tokio 无界通道的端口，投递到对端的收件箱。
#[derive(Clone)]
pub struct MpscPort {
    peer: mpsc::UnboundedSender<InboundMessage>,
}

impl MpscPort {
    pub fn new(peer: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self { peer }
    }
}

impl MessagePort for MpscPort {
    fn post(&self, message: Value, origin: &str) -> Result<(), ChannelError> {
        self.peer
            .send(InboundMessage::new(origin, message))
            .map_err(|_| ChannelError::Port {
                reason: "peer inbox is closed".to_owned(),
            })
    }
}

impl fmt::Debug for MpscPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpscPort")
            .field("closed", &self.peer.is_closed())
            .finish()
    }
}

/// 一端：向对端投递的端口，以及本端的收件箱。
#[derive(Debug)]
pub struct PortEnd {
    pub port: MpscPort,
    pub inbox: mpsc::UnboundedReceiver<InboundMessage>,
}

/// 创建一对互相连接的端点。
pub fn port_pair() -> (PortEnd, PortEnd) {
    let (to_a, inbox_a) = mpsc::unbounded_channel();
    let (to_b, inbox_b) = mpsc::unbounded_channel();
    (
        PortEnd {
            port: MpscPort::new(to_b),
            inbox: inbox_a,
        },
        PortEnd {
            port: MpscPort::new(to_a),
            inbox: inbox_b,
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn posts_arrive_at_the_peer_with_the_declared_origin() {
        let (mut a, b) = port_pair();
        b.port.post(json!({"hello": 1}), "https://b.example").expect("post");
        let received = a.inbox.try_recv().expect("delivered");
        assert_eq!(received.origin, "https://b.example");
        assert_eq!(received.data, json!({"hello": 1}));
    }

    #[test]
    fn posting_to_a_dropped_peer_fails() {
        let (a, b) = port_pair();
        drop(b);
        let err = a.port.post(json!(null), "https://a.example").expect_err("closed");
        assert_eq!(err.code(), "spark.bridge.channel.port_failed");
    }
}

use std::time::Duration;

use thiserror::Error;

use crate::{envelope::CorrelationId, topic::Topic};

/// 消息通道错误。
///
/// # 教案级注释
/// - **契约 (What)**：
///   - `Timeout` 与 `Rejected` 严格区分：前者是截止时间内没有合法回复，后者是对端明确拒绝；
///   - 来源不符、关联 ID 未知等情况不是错误，入站消息被静默忽略；
///   - [`ChannelError::code`] 返回稳定错误码；
/// - **风险 (Trade-offs)**：通道从不自动重试，超时后是否重发由调用方决定。
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 截止时间内未收到合法回复。
    #[error("`{topic}` request {id} timed out after {after:?}")]
    Timeout {
        topic: Topic,
        id: CorrelationId,
        after: Duration,
    },
    /// 对端以 `error` 字段拒绝了请求。
    #[error("`{topic}` request {id} was refused: {reason}")]
    Rejected {
        topic: Topic,
        id: CorrelationId,
        reason: String,
    },
    /// 通道已关闭。
    #[error("message channel is closed")]
    Closed,
    /// 该主题没有配对的响应主题，不能作为请求发送或注册处理方。
    #[error("`{topic}` is not a request topic")]
    NotARequestTopic { topic: Topic },
    /// 底层端口投递失败。
    #[error("message port rejected the post: {reason}")]
    Port { reason: String },
    /// 负载无法编码或解码。
    #[error("payload for `{topic}` is malformed: {source}")]
    Payload {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
    /// 当前线程没有 Tokio 运行时，无法派生监听或处理任务。
    #[error("no async runtime is available for the message channel")]
    RuntimeUnavailable,
}

impl ChannelError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "spark.bridge.channel.timeout",
            Self::Rejected { .. } => "spark.bridge.channel.rejected",
            Self::Closed => "spark.bridge.channel.closed",
            Self::NotARequestTopic { .. } => "spark.bridge.channel.not_a_request_topic",
            Self::Port { .. } => "spark.bridge.channel.port_failed",
            Self::Payload { .. } => "spark.bridge.channel.malformed_payload",
            Self::RuntimeUnavailable => "spark.bridge.channel.runtime_unavailable",
        }
    }

    /// 是否为超时。
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

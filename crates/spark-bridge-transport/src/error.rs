use thiserror::Error;

use crate::session::SessionState;

const INVALID_STATE: &str = "spark.bridge.transport.invalid_state";
const CLIENT_STREAMING_UNSUPPORTED: &str = "spark.bridge.transport.client_streaming_unsupported";
const CONNECTION_FAILED: &str = "spark.bridge.transport.connection_failed";
const REMOTE: &str = "spark.bridge.transport.remote_error";
const RUNTIME_UNAVAILABLE: &str = "spark.bridge.transport.runtime_unavailable";
const SEQUENCE_VIOLATION: &str = "spark.bridge.transport.sequence_violation";
const CANCELLED: &str = "spark.bridge.transport.cancelled";

/// 单次流式调用可能出现的错误。
///
/// # 教案级注释
/// - **意图 (Why)**：调用方需要区分“自己用错了状态机”“对端拒绝”“根本没连上”三类情况，
///   前者是编程错误，后两者是运行期故障；
/// - **契约 (What)**：
///   - 错误值可克隆，便于同一错误同时交给 `on_end` 回调与同步返回值；
///   - [`TransportError::code`] 返回稳定的点分错误码，日志与断言应依赖错误码而非文案；
/// - **风险 (Trade-offs)**：所有错误都不会被自动重试，是否重试由上层决定。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// 在当前状态下不允许执行该操作。
    #[error("`{operation}` is not permitted while the call is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// 非流式传输上第二次发送消息。
    #[error("transport does not support client streaming; only one message may be sent per call")]
    ClientStreamingUnsupported,
    /// 收到任何响应之前连接即告失败（对应响应状态 0）。
    #[error("connection to `{url}` failed before any response: {reason}")]
    ConnectionFailed { url: String, reason: String },
    /// 对端以错误结束调用。
    #[error("call to `{url}` ended with error: {message}")]
    Remote { url: String, message: String },
    /// 当前线程没有可驱动调用的 Tokio 运行时。
    #[error("no async runtime is available to drive the call")]
    RuntimeUnavailable,
    /// 回调投递违反时序契约，该次投递已被丢弃。
    #[error("`{callback}` delivered out of order after `{after}`")]
    SequenceViolation {
        callback: &'static str,
        after: &'static str,
    },
    /// 调用已被取消，后续投递全部丢弃。
    #[error("call was cancelled")]
    Cancelled,
}

impl TransportError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => INVALID_STATE,
            Self::ClientStreamingUnsupported => CLIENT_STREAMING_UNSUPPORTED,
            Self::ConnectionFailed { .. } => CONNECTION_FAILED,
            Self::Remote { .. } => REMOTE,
            Self::RuntimeUnavailable => RUNTIME_UNAVAILABLE,
            Self::SequenceViolation { .. } => SEQUENCE_VIOLATION,
            Self::Cancelled => CANCELLED,
        }
    }

    /// 是否属于连接层故障（状态 0 或对端错误结束）。
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Remote { .. })
    }

    pub(crate) fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidState { operation, state }
    }
}

//! 线上信封格式：`{id, message, payload, error?}`。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::topic::Topic;

/// 关联 ID。
///
/// 本端发起的请求使用 UUID v4；对端发来的请求 ID 可以是任意字符串，原样回写。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// 生成新的全局唯一 ID。
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一条消息。
///
/// - `message` 为主题；未知主题的消息无法解码，会被接收方忽略；
/// - `error` 仅出现在被拒绝的响应中，存在时 `payload` 无意义。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: CorrelationId,
    pub message: Topic,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn new(id: CorrelationId, message: Topic, payload: Value) -> Self {
        Self {
            id,
            message,
            payload,
            error: None,
        }
    }

    /// 拒绝响应：携带原请求 ID 与原因，负载为空。
    pub fn refusal(id: CorrelationId, message: Topic, reason: impl Into<String>) -> Self {
        Self {
            id,
            message,
            payload: Value::Null,
            error: Some(reason.into()),
        }
    }
}

/// 端口收到的原始消息及其发送方来源。
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    pub data: Value,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

//! 封闭的、带命名空间的消息主题集合。
//!
//! `frame.*` 用于嵌入帧与页面之间，`host.*` 用于页面与宿主之间；
//! 每个请求主题都有唯一的 `*Response` 配对主题。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 消息主题。序列化为线上使用的字符串。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "getProperty")]
    GetProperty,
    #[serde(rename = "getPropertyResponse")]
    GetPropertyResponse,
    #[serde(rename = "frame.getLoginOptions")]
    FrameGetLoginOptions,
    #[serde(rename = "frame.getLoginOptionsResponse")]
    FrameGetLoginOptionsResponse,
    #[serde(rename = "frame.getSessionDetails")]
    FrameGetSessionDetails,
    #[serde(rename = "frame.getSessionDetailsResponse")]
    FrameGetSessionDetailsResponse,
    #[serde(rename = "host.getLoginOptions")]
    HostGetLoginOptions,
    #[serde(rename = "host.getLoginOptionsResponse")]
    HostGetLoginOptionsResponse,
    #[serde(rename = "host.getSessionDetails")]
    HostGetSessionDetails,
    #[serde(rename = "host.getSessionDetailsResponse")]
    HostGetSessionDetailsResponse,
}

impl Topic {
    /// 全部主题。
    pub const ALL: [Topic; 10] = [
        Topic::GetProperty,
        Topic::GetPropertyResponse,
        Topic::FrameGetLoginOptions,
        Topic::FrameGetLoginOptionsResponse,
        Topic::FrameGetSessionDetails,
        Topic::FrameGetSessionDetailsResponse,
        Topic::HostGetLoginOptions,
        Topic::HostGetLoginOptionsResponse,
        Topic::HostGetSessionDetails,
        Topic::HostGetSessionDetailsResponse,
    ];

    /// 线上字符串。
    pub const fn as_str(self) -> &'static str {
        match self {
            Topic::GetProperty => "getProperty",
            Topic::GetPropertyResponse => "getPropertyResponse",
            Topic::FrameGetLoginOptions => "frame.getLoginOptions",
            Topic::FrameGetLoginOptionsResponse => "frame.getLoginOptionsResponse",
            Topic::FrameGetSessionDetails => "frame.getSessionDetails",
            Topic::FrameGetSessionDetailsResponse => "frame.getSessionDetailsResponse",
            Topic::HostGetLoginOptions => "host.getLoginOptions",
            Topic::HostGetLoginOptionsResponse => "host.getLoginOptionsResponse",
            Topic::HostGetSessionDetails => "host.getSessionDetails",
            Topic::HostGetSessionDetailsResponse => "host.getSessionDetailsResponse",
        }
    }

    /// 请求主题对应的响应主题；响应主题返回 `None`。
    pub const fn response_topic(self) -> Option<Topic> {
        match self {
            Topic::GetProperty => Some(Topic::GetPropertyResponse),
            Topic::FrameGetLoginOptions => Some(Topic::FrameGetLoginOptionsResponse),
            Topic::FrameGetSessionDetails => Some(Topic::FrameGetSessionDetailsResponse),
            Topic::HostGetLoginOptions => Some(Topic::HostGetLoginOptionsResponse),
            Topic::HostGetSessionDetails => Some(Topic::HostGetSessionDetailsResponse),
            _ => None,
        }
    }

    pub const fn is_request(self) -> bool {
        self.response_topic().is_some()
    }

    /// `frame.*` 请求在宿主侧的对应请求。
    pub const fn host_counterpart(self) -> Option<Topic> {
        match self {
            Topic::FrameGetLoginOptions => Some(Topic::HostGetLoginOptions),
            Topic::FrameGetSessionDetails => Some(Topic::HostGetSessionDetails),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

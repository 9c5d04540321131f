use std::time::Duration;

/// 消息通道的来源与超时设置。
///
/// ### 设计目的（Why）
/// - 把“发送时声明的来源”“接受回复的来源”“等待回复的时长”集中在一处，
///   由配置层一次性解析后注入通道；
///
/// ### 契约说明（What）
/// - `request_timeout`：单个请求等待合法回复的最长时间，默认 5 秒；
/// - `local_origin`：本端投递消息时声明的来源；
/// - `expected_origin`：只有来源与之逐字节相等的入站消息才会被处理；
/// - 默认来源为 `"null"`（不透明来源），不会与任何真实页面来源相等，调用方应显式设置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    request_timeout: Duration,
    local_origin: String,
    expected_origin: String,
}

impl ChannelSettings {
    /// 默认请求超时。
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
    /// 未配置时使用的不透明来源。
    pub const OPAQUE_ORIGIN: &'static str = "null";

    /// 以本端来源与期望的对端来源构造设置，超时取默认值。
    pub fn new(local_origin: impl Into<String>, expected_origin: impl Into<String>) -> Self {
        Self {
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            local_origin: local_origin.into(),
            expected_origin: expected_origin.into(),
        }
    }

    /// 覆盖请求超时。
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// 请求超时阈值。
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn local_origin(&self) -> &str {
        &self.local_origin
    }

    pub fn expected_origin(&self) -> &str {
        &self.expected_origin
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::new(Self::OPAQUE_ORIGIN, Self::OPAQUE_ORIGIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_five_seconds() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.expected_origin(), "null");
    }

    #[test]
    fn builder_overrides_timeout_only() {
        let settings = ChannelSettings::new("vscode-webview://page", "https://frame.example")
            .with_request_timeout(Duration::from_millis(250));
        assert_eq!(settings.request_timeout(), Duration::from_millis(250));
        assert_eq!(settings.local_origin(), "vscode-webview://page");
        assert_eq!(settings.expected_origin(), "https://frame.example");
    }
}

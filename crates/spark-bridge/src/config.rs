//! # BridgeConfig：从 TOML 装配通道与传输设置
//!
//! ```toml
//! [channel]
//! request_timeout_ms = 5000
//! local_origin = "vscode-webview://host"
//! expected_origin = "https://frame.example"
//!
//! [transport]
//! debug = false
//! ```
//!
//! 缺省字段回落到 [`ChannelSettings::default`]；超时为 0 或来源为空字符串视为配置错误。

use std::{path::Path, time::Duration};

use serde::Deserialize;
use spark_bridge_channel::ChannelSettings;
use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    channel: RawChannel,
    transport: RawTransport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawChannel {
    request_timeout_ms: Option<u64>,
    local_origin: Option<String>,
    expected_origin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawTransport {
    debug: bool,
}

/// 校验后的配置。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    channel: ChannelSettings,
    transport_debug: bool,
}

impl BridgeConfig {
    /// 解析 TOML 文本。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(source)?;
        Self::validate(raw)
    }

    /// 读取并解析 TOML 文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        debug!(path = %path.display(), "bridge config loaded");
        Ok(config)
    }

    pub fn channel(&self) -> &ChannelSettings {
        &self.channel
    }

    /// 传输层是否开启逐回调调试日志。
    pub const fn transport_debug(&self) -> bool {
        self.transport_debug
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let defaults = ChannelSettings::default();
        let RawChannel {
            request_timeout_ms,
            local_origin,
            expected_origin,
        } = raw.channel;

        let request_timeout = match request_timeout_ms {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    field: "channel.request_timeout_ms",
                    reason: "must be greater than zero",
                });
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.request_timeout(),
        };
        let local_origin = non_empty(
            "channel.local_origin",
            local_origin.unwrap_or_else(|| defaults.local_origin().to_owned()),
        )?;
        let expected_origin = non_empty(
            "channel.expected_origin",
            expected_origin.unwrap_or_else(|| defaults.expected_origin().to_owned()),
        )?;

        Ok(Self {
            channel: ChannelSettings::new(local_origin, expected_origin)
                .with_request_timeout(request_timeout),
            transport_debug: raw.transport.debug,
        })
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must not be empty",
        });
    }
    Ok(value)
}

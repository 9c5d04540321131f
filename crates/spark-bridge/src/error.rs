use std::path::PathBuf;

use spark_bridge_cache::EndpointKey;
use spark_bridge_transport::TransportError;
use thiserror::Error;

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件无法读取。
    #[error("cannot read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 语法或字段类型错误。
    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值非法。
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "spark.bridge.config.io",
            Self::Parse(_) => "spark.bridge.config.parse",
            Self::Invalid { .. } => "spark.bridge.config.invalid",
        }
    }
}

/// 日志订阅器安装错误。
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// 本模块已安装过订阅器。
    #[error("spark-bridge observability is already installed")]
    AlreadyInstalled,
    /// 外部已设置了全局订阅器。
    #[error("a global tracing subscriber was set elsewhere")]
    SubscriberAlreadySet,
    #[error("failed to set the global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

impl ObservabilityError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInstalled => "spark.bridge.observability.already_installed",
            Self::SubscriberAlreadySet => "spark.bridge.observability.subscriber_already_set",
            Self::SetGlobalSubscriber(_) => "spark.bridge.observability.set_global_failed",
        }
    }
}

/// 远端服务句柄的错误。
#[derive(Debug, Error)]
pub enum RpcServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// 握手得到了非成功状态。
    #[error("handshake with `{endpoint}` answered status {status}")]
    Handshake { endpoint: EndpointKey, status: u16 },
    /// 句柄已被释放。
    #[error("service for `{endpoint}` has been disposed")]
    Disposed { endpoint: EndpointKey },
}

impl RpcServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(err) => err.code(),
            Self::Handshake { .. } => "spark.bridge.service.handshake_failed",
            Self::Disposed { .. } => "spark.bridge.service.disposed",
        }
    }
}

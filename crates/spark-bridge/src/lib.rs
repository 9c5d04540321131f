#![deny(unsafe_code)]
#![doc = "spark-bridge: 编辑器与远端查询服务端之间的通信与缓存层。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：把服务句柄缓存、流式传输与跨上下文消息通道装配成一个可直接使用的入口。"]
#![doc = "- **What**：[`BridgeConfig`] 配置加载、[`observability::install`] 日志安装、[`RpcServiceFactory`] 服务工厂，并重导出三个子 crate。"]
#![doc = "- **How**：缓存未命中时经由传输层握手建立句柄；消息通道设置由配置注入。"]

pub mod config;
mod error;
pub mod observability;
mod service;

pub use config::BridgeConfig;
pub use error::{ConfigError, ObservabilityError, RpcServiceError};
pub use service::{DEFAULT_HANDSHAKE_METHOD, RpcService, RpcServiceCache, RpcServiceFactory};

pub use spark_bridge_cache as cache;
pub use spark_bridge_channel as channel;
pub use spark_bridge_transport as transport;

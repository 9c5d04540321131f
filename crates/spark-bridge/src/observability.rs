//! 全局日志订阅器的一次性安装入口。

use std::sync::OnceLock;

use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

use crate::error::ObservabilityError;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// `RUST_LOG` 未设置时使用的过滤指令。
pub const DEFAULT_DIRECTIVES: &str = "info,spark_bridge=debug";

/// 安装 `fmt + EnvFilter` 全局订阅器。
///
/// # 教案式说明
/// - **意图（Why）**：宿主进程只需调用一次即可看到缓存、传输与通道的结构化日志；
/// - **逻辑（How）**：
///   1. 已由本函数安装过则返回 [`ObservabilityError::AlreadyInstalled`]；
///   2. 外部已设置全局订阅器则返回 [`ObservabilityError::SubscriberAlreadySet`]，不覆盖宿主的选择；
///   3. 过滤器优先读取 `RUST_LOG`，否则使用 [`DEFAULT_DIRECTIVES`]。
/// - **契约（What）**：成功后全局订阅器在进程生命周期内保持有效。
pub fn install() -> Result<(), ObservabilityError> {
    if INSTALLED.get().is_some() {
        return Err(ObservabilityError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(ObservabilityError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED
        .set(())
        .map_err(|_| ObservabilityError::AlreadyInstalled)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中声明缓存层对外暴露的错误：端点解析失败、资源释放失败以及工厂失败的透传包装；
//! - 每个错误都提供稳定的 `code()`，便于日志与告警按错误码聚合。
//!
//! ## 设计要求（What）
//! - 全部错误派生 `thiserror::Error`，兼容 `std::error::Error` 生态；
//! - 工厂错误以 `Arc<E>` 形式共享：同一次失败会同时交付给所有等待者，必须是“同一个”错误实例。

use std::{error::Error as StdError, sync::Arc};

use thiserror::Error;

/// 端点 URL 规范化失败。
///
/// - **意图 (Why)**：缓存键必须来自可解析、带主机名的 URL，否则“逻辑等价端点”无从判断；
/// - **契约 (What)**：`input` 保留调用方原始输入，便于排障时直接比对。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EndpointError {
    /// 输入无法被解析为 URL。
    #[error("endpoint `{input}` is not a valid url: {reason}")]
    Malformed { input: String, reason: String },

    /// URL 合法但缺少主机部分。
    #[error("endpoint `{input}` has no host component")]
    MissingHost { input: String },

    /// scheme 不是 `http`/`https`。
    #[error("endpoint `{input}` uses unsupported scheme `{scheme}`")]
    UnsupportedScheme { input: String, scheme: String },
}

impl EndpointError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            EndpointError::Malformed { .. } => "spark.bridge.cache.endpoint_malformed",
            EndpointError::MissingHost { .. } => "spark.bridge.cache.endpoint_missing_host",
            EndpointError::UnsupportedScheme { .. } => {
                "spark.bridge.cache.endpoint_unsupported_scheme"
            }
        }
    }
}

/// 资源释放（`dispose`）失败。
///
/// # 教案式说明
/// - **意图 (Why)**：释放失败只会被记录，不会阻断其他条目的释放；统一包装便于在
///   [`DisposalReport`](crate::DisposalReport) 中集中汇总；
/// - **契约 (What)**：内部以 `Box<dyn Error + Send + Sync>` 保存底层原因，调用方可经由
///   `source()` 逐级追溯。
#[derive(Debug, Error)]
#[error("dispose failed: {source}")]
pub struct DisposeError {
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl DisposeError {
    /// 由任意错误或字符串构造。
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        "spark.bridge.cache.dispose_failed"
    }
}

/// [`ServiceCache`](crate::ServiceCache) 查询失败。
///
/// - **契约 (What)**：`Endpoint` 表示输入 URL 本身不合法，工厂从未被调用；`Factory` 原样透传
///   工厂失败，条目已在失败的同一步被移除，下次查询会重新创建。
/// - **风险 (Trade-offs)**：缓存层不做重试，是否重试由调用方决定。
#[derive(Debug, Error)]
pub enum ServiceCacheError<E>
where
    E: StdError + Send + Sync + 'static,
{
    /// 端点无法规范化。
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// 服务工厂失败。
    #[error("service factory failed: {0}")]
    Factory(#[source] Arc<E>),
}

impl<E> ServiceCacheError<E>
where
    E: StdError + Send + Sync + 'static,
{
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ServiceCacheError::Endpoint(inner) => inner.code(),
            ServiceCacheError::Factory(_) => "spark.bridge.cache.factory_failed",
        }
    }

    /// 若为工厂失败，返回共享的原始错误。
    pub fn factory_error(&self) -> Option<&Arc<E>> {
        match self {
            ServiceCacheError::Factory(inner) => Some(inner),
            ServiceCacheError::Endpoint(_) => None,
        }
    }
}

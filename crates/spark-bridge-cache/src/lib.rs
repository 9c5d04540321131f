#![deny(unsafe_code)]
#![doc = "spark-bridge-cache: 按端点去重的异步记忆化缓存。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：编辑器会在同一时刻为同一查询服务端发起多次句柄请求，创建必须去重，失败必须可重试。"]
#![doc = "- **What**：提供通用的 [`AsyncKeyedCache`]、URL 规范化键 [`EndpointKey`] 以及带释放语义的 [`ServiceCache`]。"]
#![doc = "- **How**：以 `DashMap` 保存 `Shared` Future，登记发生在调用方挂起之前；失败在交付前按代际号移除。"]

mod dispose;
mod endpoint;
mod error;
mod keyed;
mod service;

pub use dispose::{DisposalReport, Disposable};
pub use endpoint::EndpointKey;
pub use error::{DisposeError, EndpointError, ServiceCacheError};
pub use keyed::{AsyncKeyedCache, CacheOutcome, EntryState, Evicted, KeyedFactory, SharedOutcome};
pub use service::{ServiceCache, ServiceFactory};

/// 供 [`Disposable`] / [`ServiceFactory`] 实现方使用的 `async_trait` 重导出。
pub use async_trait::async_trait;

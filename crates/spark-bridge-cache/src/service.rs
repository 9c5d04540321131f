//! # ServiceCache：按服务端 URL 缓存长生命周期服务句柄
//!
//! ## 定位（Why）
//! - 编辑器侧的每个查询服务端只应持有一个服务句柄；树视图、状态栏、查询执行等调用方会在
//!   同一时刻请求同一端点，句柄创建必须去重；
//! - 断开或切换账户时需要批量拆除全部句柄。
//!
//! ## 契约（What）
//! - 正确性完全建立在 [`AsyncKeyedCache`] 的同键串行化之上，本层不引入额外锁；
//! - 输入 URL 先规范化为 [`EndpointKey`]，非法 URL 直接返回错误且不调用工厂；
//! - [`ServiceCache::dispose_all`] 采用“收集后继续”：逐个释放，失败写入报告而不中止；
//!   仍在创建中的句柄在结算后释放，拆除之后不会残留未归还的句柄。

use std::{error::Error as StdError, fmt, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    dispose::{DisposalReport, Disposable},
    endpoint::EndpointKey,
    error::{EndpointError, ServiceCacheError},
    keyed::{AsyncKeyedCache, EntryState, Evicted, SharedOutcome},
};

/// 外部提供的服务工厂。
///
/// # 教案级注释
/// - **意图 (Why)**：缓存不关心句柄如何建立（直连、经由传输层握手、复用凭据），只负责“同键一次”；
/// - **契约 (What)**：
///   - `Service` 需可克隆（通常为 `Arc` 包装）并具备释放能力；
///   - `create` 对每次缓存未命中恰好调用一次，失败原样透传给所有等待者；
/// - **风险 (Trade-offs)**：工厂内部不应自行重试，否则失败不缓存的语义会被掩盖。
#[async_trait]
pub trait ServiceFactory: Send + Sync + 'static {
    /// 产出的服务句柄。
    type Service: Disposable + Clone + Send + Sync + 'static;
    /// 创建失败的错误类型。
    type Error: StdError + Send + Sync + 'static;

    /// 为规范化端点创建服务句柄。
    async fn create(&self, endpoint: &EndpointKey) -> Result<Self::Service, Self::Error>;
}

type ServiceOutcome<F> =
    SharedOutcome<<F as ServiceFactory>::Service, <F as ServiceFactory>::Error>;

/// 服务句柄缓存。
pub struct ServiceCache<F>
where
    F: ServiceFactory,
{
    cache: AsyncKeyedCache<EndpointKey, F::Service, F::Error>,
}

impl<F> ServiceCache<F>
where
    F: ServiceFactory,
{
    /// 以服务工厂构造缓存。
    pub fn new(factory: F) -> Self {
        let factory = Arc::new(factory);
        let cache = AsyncKeyedCache::named("service", move |endpoint: EndpointKey| {
            let factory = Arc::clone(&factory);
            async move { factory.create(&endpoint).await }
        });
        Self { cache }
    }

    /// 获取 `url` 对应的服务句柄。
    pub async fn get(&self, url: &str) -> Result<F::Service, ServiceCacheError<F::Error>> {
        let endpoint = EndpointKey::parse(url)?;
        self.get_endpoint(endpoint).await
    }

    /// 以已规范化的端点获取服务句柄。
    pub async fn get_endpoint(
        &self,
        endpoint: EndpointKey,
    ) -> Result<F::Service, ServiceCacheError<F::Error>> {
        self.cache
            .get(endpoint)
            .await
            .map_err(ServiceCacheError::Factory)
    }

    /// 返回 `url` 对应的共享结果句柄；同一尝试期间的多次调用返回指向同一结果的句柄。
    pub fn join(&self, url: &str) -> Result<ServiceOutcome<F>, EndpointError> {
        Ok(self.cache.join(EndpointKey::parse(url)?))
    }

    /// 查询端点的缓存状态。
    pub fn state(&self, url: &str) -> Result<Option<EntryState>, EndpointError> {
        Ok(self.cache.state(&EndpointKey::parse(url)?))
    }

    /// 使端点失效并释放其句柄；返回是否确有条目被移除。
    pub async fn invalidate(&self, url: &str) -> Result<bool, EndpointError> {
        let endpoint = EndpointKey::parse(url)?;
        Ok(self.cache.invalidate(&endpoint).await)
    }

    /// 拆除全部条目并释放所有已结算的句柄。
    ///
    /// # 教案式注释
    /// - **执行逻辑 (How)**：先整体移出缓存，再逐个 `dispose`；释放在移除之后进行，期间到达的新查询
    ///   会创建新句柄而不会拿到正在释放的旧句柄；
    /// - **契约 (What)**：单个释放失败记录 `warn` 日志并写入报告，随后继续处理下一条；
    ///   仍在创建中的条目不阻塞拆除，其值在结算后由分离任务释放，并计入
    ///   [`DisposalReport::deferred`]。
    pub async fn dispose_all(&self) -> DisposalReport<EndpointKey> {
        let mut report = DisposalReport::new();
        for (endpoint, evicted) in self.cache.drain() {
            match evicted {
                Evicted::Resolved(service) => match service.dispose().await {
                    Ok(()) => report.record_success(),
                    Err(err) => {
                        warn!(
                            endpoint = %endpoint,
                            code = err.code(),
                            error = %err,
                            "dispose failed during teardown; continuing"
                        );
                        report.record_failure(endpoint, err);
                    }
                },
                Evicted::Pending(outcome) => {
                    self.cache.dispose_when_settled(endpoint, outcome).await;
                    report.record_deferred();
                }
            }
        }
        debug!(
            disposed = report.disposed(),
            failed = report.failures().len(),
            deferred = report.deferred(),
            "service cache torn down"
        );
        report
    }

    /// 缓存中的端点数量。
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl<F> fmt::Debug for ServiceCache<F>
where
    F: ServiceFactory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCache")
            .field("cache", &self.cache)
            .finish()
    }
}

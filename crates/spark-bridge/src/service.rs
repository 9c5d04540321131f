//! # RpcServiceFactory：经由传输层建立远端服务句柄
//!
//! ## 定位（Why）
//! - [`ServiceCache`](spark_bridge_cache::ServiceCache) 只负责“同端点一次”，句柄如何建立由工厂决定；
//! - 本工厂在缓存未命中时对端点做一次连通性握手，握手成功才把句柄交给缓存，
//!   失败则原样返回，由缓存负责“失败不缓存”。
//!
//! ## 契约（What）
//! - 握手是对 `handshake_method` 发起的一次单消息调用，状态须为 2xx；
//! - [`RpcService::call`] 经由 [`run_exchange`] 发起调用，自动适配传输是否支持客户端流；
//! - 句柄释放后再调用返回 [`RpcServiceError::Disposed`]；重复释放为无操作。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use spark_bridge_cache::{DisposeError, Disposable, EndpointKey, ServiceCache, ServiceFactory};
use spark_bridge_transport::{
    CallOutcome, Exchange, Metadata, ResponseHeaders, TransportFactory, run_exchange,
};
use tracing::{debug, info};

use crate::error::RpcServiceError;

/// 默认握手方法。
pub const DEFAULT_HANDSHAKE_METHOD: &str = "spark.bridge.v1.Connectivity/Ping";

/// 以 [`RpcServiceFactory`] 为工厂的服务缓存。
pub type RpcServiceCache<T> = ServiceCache<RpcServiceFactory<T>>;

/// 以传输工厂建立 [`RpcService`] 的服务工厂。
pub struct RpcServiceFactory<T> {
    transport: Arc<T>,
    handshake_method: String,
    metadata: Metadata,
    debug: bool,
}

impl<T> RpcServiceFactory<T>
where
    T: TransportFactory,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            handshake_method: DEFAULT_HANDSHAKE_METHOD.to_owned(),
            metadata: Metadata::new(),
            debug: false,
        }
    }

    /// 覆盖握手方法。
    pub fn with_handshake_method(mut self, method: impl Into<String>) -> Self {
        self.handshake_method = method.into();
        self
    }

    /// 每次调用都携带的请求元数据（例如认证头）。
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// 以本工厂构造服务缓存。
    pub fn into_cache(self) -> RpcServiceCache<T> {
        ServiceCache::new(self)
    }
}

#[async_trait]
impl<T> ServiceFactory for RpcServiceFactory<T>
where
    T: TransportFactory,
{
    type Service = RpcService<T>;
    type Error = RpcServiceError;

    async fn create(&self, endpoint: &EndpointKey) -> Result<Self::Service, Self::Error> {
        let url = endpoint.method_url(&self.handshake_method);
        debug!(endpoint = %endpoint, "handshaking with query server");
        let outcomes = run_exchange(
            self.transport.as_ref(),
            &url,
            Exchange::new([Bytes::new()])
                .with_metadata(self.metadata.clone())
                .with_debug(self.debug),
        )
        .await?;

        let headers = outcomes
            .first()
            .map(|outcome| outcome.headers().clone())
            .unwrap_or_else(ResponseHeaders::connection_failure);
        if !(200..300).contains(&headers.status()) {
            return Err(RpcServiceError::Handshake {
                endpoint: endpoint.clone(),
                status: headers.status(),
            });
        }

        info!(endpoint = %endpoint, status = headers.status(), "query server connected");
        Ok(RpcService {
            inner: Arc::new(ServiceInner {
                endpoint: endpoint.clone(),
                transport: Arc::clone(&self.transport),
                metadata: self.metadata.clone(),
                server_metadata: headers.metadata().clone(),
                debug: self.debug,
                disposed: AtomicBool::new(false),
            }),
        })
    }
}

impl<T> fmt::Debug for RpcServiceFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServiceFactory")
            .field("handshake_method", &self.handshake_method)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

struct ServiceInner<T> {
    endpoint: EndpointKey,
    transport: Arc<T>,
    metadata: Metadata,
    server_metadata: Metadata,
    debug: bool,
    disposed: AtomicBool,
}

/// 一个已连通查询服务端的句柄，可廉价克隆。
pub struct RpcService<T> {
    inner: Arc<ServiceInner<T>>,
}

impl<T> Clone for RpcService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> RpcService<T>
where
    T: TransportFactory,
{
    pub fn endpoint(&self) -> &EndpointKey {
        &self.inner.endpoint
    }

    /// 握手响应携带的服务端元数据。
    pub fn server_metadata(&self) -> &Metadata {
        &self.inner.server_metadata
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// 调用 `method`，发送 `messages` 并返回每次调用的响应。
    pub async fn call<I, M>(
        &self,
        method: &str,
        messages: I,
    ) -> Result<Vec<CallOutcome>, RpcServiceError>
    where
        I: IntoIterator<Item = M>,
        M: Into<Bytes>,
    {
        if self.is_disposed() {
            return Err(RpcServiceError::Disposed {
                endpoint: self.inner.endpoint.clone(),
            });
        }
        let exchange = Exchange::new(messages)
            .with_metadata(self.inner.metadata.clone())
            .with_debug(self.inner.debug);
        let outcomes = run_exchange(
            self.inner.transport.as_ref(),
            &self.inner.endpoint.method_url(method),
            exchange,
        )
        .await?;
        Ok(outcomes)
    }
}

#[async_trait]
impl<T> Disposable for RpcService<T>
where
    T: TransportFactory,
{
    async fn dispose(&self) -> Result<(), DisposeError> {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            debug!(endpoint = %self.inner.endpoint, "query server handle disposed");
        }
        Ok(())
    }
}

impl<T> fmt::Debug for RpcService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcService")
            .field("endpoint", &self.inner.endpoint)
            .field("disposed", &self.inner.disposed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

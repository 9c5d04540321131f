//! 资源释放能力标记与批量释放报告。

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DisposeError;

/// 显式的“可释放”能力。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 缓存中的长生命周期句柄（连接、会话客户端）在失效或整体拆除时需要归还底层资源；
/// - 以 trait 表达能力：一个类型要么实现 `Disposable`，要么不实现，编译期即可确定
///   [`AsyncKeyedCache::invalidate`](crate::AsyncKeyedCache::invalidate) 是否可用。
///
/// ## 契约（What）
/// - `dispose` 可能失败，失败只会被缓存记录（`warn` 级日志）或汇总进 [`DisposalReport`]，不会向上传播；
/// - 实现应保持幂等：同一句柄可能经由多个克隆被重复释放。
#[async_trait]
pub trait Disposable: Send + Sync {
    /// 释放底层资源。
    async fn dispose(&self) -> Result<(), DisposeError>;
}

#[async_trait]
impl<T> Disposable for Arc<T>
where
    T: Disposable + ?Sized,
{
    async fn dispose(&self) -> Result<(), DisposeError> {
        (**self).dispose().await
    }
}

/// 批量释放的结果汇总。
///
/// - **契约 (What)**：`disposed` 统计成功释放的条目数；`failures` 按遍历顺序记录失败键与错误；
/// - 批量释放采用“收集后继续”策略，单个失败不会中止其余条目。
#[derive(Debug)]
pub struct DisposalReport<K> {
    disposed: usize,
    deferred: usize,
    failures: Vec<(K, DisposeError)>,
}

impl<K> DisposalReport<K> {
    pub(crate) fn new() -> Self {
        Self {
            disposed: 0,
            deferred: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.disposed += 1;
    }

    pub(crate) fn record_deferred(&mut self) {
        self.deferred += 1;
    }

    pub(crate) fn record_failure(&mut self, key: K, error: DisposeError) {
        self.failures.push((key, error));
    }

    /// 成功释放的条目数量。
    pub fn disposed(&self) -> usize {
        self.disposed
    }

    /// 拆除时仍处于创建中的条目数量；这些值在创建完成后才被释放，成败只记录在日志中。
    pub fn deferred(&self) -> usize {
        self.deferred
    }

    /// 释放失败的条目。
    pub fn failures(&self) -> &[(K, DisposeError)] {
        &self.failures
    }

    /// 是否全部成功。
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

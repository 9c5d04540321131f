//! 调用参数：请求元数据、响应头与回调集合。

use std::{collections::BTreeMap, fmt, sync::Arc};

use bytes::Bytes;

use crate::error::TransportError;

/// 请求/响应元数据。
///
/// 键在写入时统一转为小写，与 HTTP 头部大小写无关的语义保持一致；同名键后写覆盖先写。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// 空元数据。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以链式方式追加一项。
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// 写入一项，返回被覆盖的旧值。
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.as_ref().to_ascii_lowercase(), value.into())
    }

    /// 读取一项。
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// 按键序遍历。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.insert(key, value);
        }
        metadata
    }
}

/// `on_headers` 携带的响应状态与头部。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHeaders {
    status: u16,
    metadata: Metadata,
}

impl ResponseHeaders {
    /// 连接失败时使用的哨兵状态。
    pub const CONNECTION_FAILURE_STATUS: u16 = 0;
    /// 处理方未显式写头部时的默认状态。
    pub const OK_STATUS: u16 = 200;

    pub fn new(status: u16, metadata: Metadata) -> Self {
        Self { status, metadata }
    }

    /// 状态 200、无头部。
    pub fn ok() -> Self {
        Self::new(Self::OK_STATUS, Metadata::new())
    }

    /// 状态 0：在收到任何响应之前连接即失败。
    pub fn connection_failure() -> Self {
        Self::new(Self::CONNECTION_FAILURE_STATUS, Metadata::new())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// 是否为状态 0。
    pub fn is_connection_failure(&self) -> bool {
        self.status == Self::CONNECTION_FAILURE_STATUS
    }
}

/// 一次调用的回调集合。
///
/// # 教案级注释
/// - **契约 (What)**：
///   - `on_headers` 恰好一次且先于任何 `on_chunk`；
///   - `on_chunk` 零到多次，按到达顺序交付不透明字节；
///   - `on_end` 恰好一次且最后触发，可携带错误；之后不再有任何回调；
///   - 取消之后不再触发任何回调，包括 `on_end`；
/// - **前置条件**：同一调用的回调逐个串行投递，实现方无需自行加锁保护回调间的状态，
///   但回调内不得阻塞；回调内调用 `Transport::cancel` 是安全的。
pub trait TransportCallbacks: Send + Sync + 'static {
    fn on_headers(&self, headers: ResponseHeaders);

    fn on_chunk(&self, chunk: Bytes);

    fn on_end(&self, error: Option<TransportError>);
}

/// 创建传输时传入的不可变参数。
#[derive(Clone)]
pub struct TransportOptions {
    url: Arc<str>,
    debug: bool,
    callbacks: Arc<dyn TransportCallbacks>,
}

impl TransportOptions {
    /// 以完整的 RPC 端点 URL 与回调构造参数，调试开关默认关闭。
    pub fn new(url: impl Into<Arc<str>>, callbacks: Arc<dyn TransportCallbacks>) -> Self {
        Self {
            url: url.into(),
            debug: false,
            callbacks,
        }
    }

    /// 开启后，每次回调投递都以 `debug` 级别记录。
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn callbacks(&self) -> &Arc<dyn TransportCallbacks> {
        &self.callbacks
    }

    pub(crate) fn into_parts(self) -> (Arc<str>, bool, Arc<dyn TransportCallbacks>) {
        (self.url, self.debug, self.callbacks)
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("url", &self.url)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

//! 端点键：将 URL 规范化为缓存键。
//!
//! # 设计动机（Why）
//! - `https://Server.example/`、`https://server.example` 与 `HTTPS://server.example:443` 指向同一服务端，
//!   若直接以原始字符串为键，会为同一端点建立多份长生命周期句柄；
//! - 以受约束的新类型表达缓存键，避免“字符串即键”的隐式耦合。
//!
//! # 规范化规则（What）
//! - 仅接受 `http`/`https`：`url` crate 只对这类“特殊 scheme”小写 host，其余 scheme 的 host
//!   被当作不透明文本，无法保证等价端点落到同一键；
//! - scheme 与 host 小写（由 `url` crate 完成）；
//! - 与 scheme 默认值相同的端口被丢弃；
//! - 路径末尾的 `/` 全部去除；查询串保留，片段（`#...`）丢弃；
//! - 非层级 URL（`mailto:`、`data:`）因 scheme 不受支持而被拒绝。

use std::{fmt, str::FromStr, sync::Arc};

use url::Url;

use crate::error::EndpointError;

/// 规范化后的端点 URL。
///
/// # 契约定义（What）
/// - 构造成功后字符串即为规范形式，可直接用于比较、哈希与日志；
/// - 克隆只增加引用计数。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey(Arc<str>);

impl EndpointKey {
    /// 解析并规范化端点。
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(input.trim()).map_err(|err| EndpointError::Malformed {
            input: input.to_owned(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EndpointError::UnsupportedScheme {
                input: input.to_owned(),
                scheme: url.scheme().to_owned(),
            });
        }
        let host = url.host_str().ok_or_else(|| EndpointError::MissingHost {
            input: input.to_owned(),
        })?;

        let mut canonical = String::with_capacity(input.len());
        canonical.push_str(url.scheme());
        canonical.push_str("://");
        if !url.username().is_empty() {
            canonical.push_str(url.username());
            canonical.push('@');
        }
        canonical.push_str(host);
        // `Url::port` 在端口等于 scheme 默认值时返回 `None`。
        if let Some(port) = url.port() {
            canonical.push(':');
            canonical.push_str(&port.to_string());
        }
        canonical.push_str(url.path().trim_end_matches('/'));
        if let Some(query) = url.query() {
            canonical.push('?');
            canonical.push_str(query);
        }

        Ok(Self(Arc::from(canonical)))
    }

    /// 返回规范化字符串。
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 拼接端点下的 RPC 方法地址，例如 `https://host/api` + `Service/Method`。
    pub fn method_url(&self, method: &str) -> String {
        let base = match self.0.split_once('?') {
            Some((base, _)) => base,
            None => &self.0,
        };
        format!("{base}/{}", method.trim_start_matches('/'))
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKey {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EndpointKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equivalent_spellings_share_one_key() {
        let variants = [
            "https://Query.Example.com",
            "https://query.example.com/",
            "HTTPS://QUERY.EXAMPLE.COM:443//",
            "  https://query.example.com/#fragment ",
        ];
        for variant in variants {
            let key = EndpointKey::parse(variant).expect("端点应可解析");
            assert_eq!(key.as_str(), "https://query.example.com", "输入: {variant}");
        }
    }

    #[test]
    fn path_and_port_are_preserved() {
        let key = EndpointKey::parse("http://localhost:8080/api/v1/").expect("端点应可解析");
        assert_eq!(key.as_str(), "http://localhost:8080/api/v1");
        assert_eq!(
            key.method_url("/query.Service/Execute"),
            "http://localhost:8080/api/v1/query.Service/Execute"
        );
    }

    #[test]
    fn query_string_survives_normalization() {
        let key = EndpointKey::parse("https://host.example/path/?tenant=a").expect("端点应可解析");
        assert_eq!(key.as_str(), "https://host.example/path?tenant=a");
        assert_eq!(key.method_url("svc/M"), "https://host.example/path/svc/M");
    }

    #[test]
    fn rejects_non_hierarchical_and_garbage() {
        assert!(matches!(
            EndpointKey::parse("mailto:someone@example.com"),
            Err(EndpointError::UnsupportedScheme { .. })
        ));
        let err = EndpointKey::parse("not a url").unwrap_err();
        assert_eq!(err.code(), "spark.bridge.cache.endpoint_malformed");
    }

    #[test]
    fn rejects_schemes_without_host_normalization() {
        for input in [
            "grpc://Query.Example.com:10000/",
            "grpc://query.example.com:10000",
            "ftp://host.example/",
            "ws://host.example/socket",
        ] {
            let err = EndpointKey::parse(input).expect_err("仅接受 http/https");
            assert!(
                matches!(err, EndpointError::UnsupportedScheme { .. }),
                "输入: {input}"
            );
            assert_eq!(err.code(), "spark.bridge.cache.endpoint_unsupported_scheme");
        }
    }

    #[test]
    fn mixed_case_hosts_collapse_for_supported_schemes() {
        for scheme in ["http", "HTTP", "https", "Https"] {
            let upper = EndpointKey::parse(&format!("{scheme}://Query.Example.com:10000/"))
                .expect("端点应可解析");
            let lower = EndpointKey::parse(&format!("{scheme}://query.example.com:10000"))
                .expect("端点应可解析");
            assert_eq!(upper, lower);
        }
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            host in "[a-zA-Z][a-zA-Z0-9]{0,10}(\\.[a-zA-Z]{2,5}){1,2}",
            segments in proptest::collection::vec("[a-z0-9]{1,6}", 0..4),
            slashes in 0usize..3,
        ) {
            let raw = format!("https://{host}/{}{}", segments.join("/"), "/".repeat(slashes));
            let once = EndpointKey::parse(&raw).expect("生成的 URL 应合法");
            let twice = EndpointKey::parse(once.as_str()).expect("规范形式应可再次解析");
            prop_assert_eq!(&once, &twice);
            prop_assert!(!once.as_str().ends_with('/'));
            prop_assert!(once.as_str().starts_with("https://"));
        }
    }
}

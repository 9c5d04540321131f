//! # FrameRelay：把嵌入帧的请求转发给宿主
//!
//! 页面持有两条通道：一条面向嵌入帧（期望来源为帧的来源），一条面向宿主。
//! 帧发来的 `frame.getLoginOptions` / `frame.getSessionDetails` 被改写为对应的 `host.*`
//! 请求发往宿主，宿主的回复（或拒绝、超时）再以 `frame.*Response` 和原 ID 回给帧。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    channel::{MessageChannel, RequestHandler},
    error::ChannelError,
    topic::Topic,
};

/// 已安装的转发路由。
#[derive(Debug)]
pub struct FrameRelay {
    routes: Vec<(Topic, Topic)>,
}

impl FrameRelay {
    /// 被转发的帧侧请求主题。
    pub const FRAME_TOPICS: [Topic; 2] = [Topic::FrameGetLoginOptions, Topic::FrameGetSessionDetails];

    /// 在 `frame` 通道上为每个帧侧请求主题注册转发处理方。
    pub fn install(frame: &MessageChannel, host: &Arc<MessageChannel>) -> Result<Self, ChannelError> {
        let mut routes = Vec::with_capacity(Self::FRAME_TOPICS.len());
        for topic in Self::FRAME_TOPICS {
            let upstream = topic
                .host_counterpart()
                .ok_or(ChannelError::NotARequestTopic { topic })?;
            frame.serve(
                topic,
                RelayRoute {
                    host: Arc::clone(host),
                    upstream,
                },
            )?;
            routes.push((topic, upstream));
        }
        debug!(routes = routes.len(), "frame relay installed");
        Ok(Self { routes })
    }

    /// `(帧侧主题, 宿主侧主题)` 列表。
    pub fn routes(&self) -> &[(Topic, Topic)] {
        &self.routes
    }
}

struct RelayRoute {
    host: Arc<MessageChannel>,
    upstream: Topic,
}

#[async_trait]
impl RequestHandler for RelayRoute {
    async fn handle(&self, payload: Value) -> Result<Value, ChannelError> {
        self.host.request(self.upstream, payload).await
    }
}

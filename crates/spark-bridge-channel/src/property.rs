//! 命名属性查询：`getProperty` → `getPropertyResponse {name, value}`。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    channel::{MessageChannel, RequestHandler},
    error::ChannelError,
    topic::Topic,
};

/// 属性查询的回复负载。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl PropertyValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl MessageChannel {
    /// 向对端查询命名属性。
    pub async fn get_property(&self, name: &str) -> Result<PropertyValue, ChannelError> {
        let payload = self.request(Topic::GetProperty, Value::from(name)).await?;
        serde_json::from_value(payload).map_err(|source| ChannelError::Payload {
            topic: Topic::GetPropertyResponse,
            source,
        })
    }

    /// 以查找函数应答 `getProperty`；未知属性回复 `null` 值。
    pub fn serve_properties<F>(&self, lookup: F) -> Result<(), ChannelError>
    where
        F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        self.serve(Topic::GetProperty, PropertyResponder { lookup })
    }
}

struct PropertyResponder<F> {
    lookup: F,
}

#[async_trait]
impl<F> RequestHandler for PropertyResponder<F>
where
    F: Fn(&str) -> Option<Value> + Send + Sync + 'static,
{
    async fn handle(&self, payload: Value) -> Result<Value, ChannelError> {
        let name: String = serde_json::from_value(payload).map_err(|source| {
            ChannelError::Payload {
                topic: Topic::GetProperty,
                source,
            }
        })?;
        let value = (self.lookup)(&name).unwrap_or(Value::Null);
        serde_json::to_value(PropertyValue { name, value }).map_err(|source| {
            ChannelError::Payload {
                topic: Topic::GetPropertyResponse,
                source,
            }
        })
    }
}

//! HTTP 工具：把检索请求转发给进程外的数据源桥（CRM / SQL / 向量检索服务）
//!
//! POST `{"source_id", "query", "entity_id"}` 到目录中声明的 endpoint；带超时，非 2xx 视为失败。
//! JSON 响应若含 `content` / `text` / `answer` 字段则取其文本，否则原样返回响应体。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

pub struct HttpTool {
    name: String,
    endpoint: String,
    client: Client,
}

impl HttpTool {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("honeycomb/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        }
    }
}

/// 从 JSON 响应中取出正文
fn extract_content(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    ["content", "text", "answer"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(String::from)
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Forwards the query to a remote source bridge over HTTP"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&args)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        let body = body.strip_prefix('\u{FEFF}').unwrap_or(&body);
        Ok(extract_content(body))
    }
}

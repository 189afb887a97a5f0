//! 固定结果工具（测试 / 本地演示用）
//!
//! 返回预设文本，可配置为失败或延迟返回；记录收到的每次参数，便于断言实体 id 是否透传。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub struct StaticTool {
    name: String,
    payload: String,
    failure: Option<String>,
    delay: Option<Duration>,
    received: Mutex<Vec<Value>>,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            failure: None,
            delay: None,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut tool = Self::new(name, "");
        tool.failure = Some(reason.into());
        tool
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的调用参数（按调用顺序）
    pub fn received(&self) -> Vec<Value> {
        self.received
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed payload (for testing)"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        if let Ok(mut calls) = self.received.lock() {
            calls.push(args);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(self.payload.clone()),
        }
    }
}

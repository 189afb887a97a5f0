//! 领域简报：一段静态的业务背景文本，拼入合成提示词
//!
//! 首次使用时加载，按 TTL 缓存；加载失败视为「无简报」（空字符串），不影响本轮。
//! 「未加载」与「已加载但为空」是两个不同状态。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// 简报来源
#[async_trait]
pub trait BriefingSource: Send + Sync {
    async fn load(&self) -> Result<String, String>;
}

/// 从文件读取简报
pub struct FileBriefing {
    path: PathBuf,
}

impl FileBriefing {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BriefingSource for FileBriefing {
    async fn load(&self) -> Result<String, String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("{}: {}", self.path.display(), e))
    }
}

/// 固定文本（测试用）
#[async_trait]
impl BriefingSource for String {
    async fn load(&self) -> Result<String, String> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
enum CacheState {
    NotLoaded,
    Loaded { text: String, at: Instant },
}

/// 带 TTL 缓存的领域简报
pub struct DomainBriefing {
    source: Option<Arc<dyn BriefingSource>>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl DomainBriefing {
    pub fn new(source: Arc<dyn BriefingSource>, ttl: Duration) -> Self {
        Self {
            source: Some(source),
            ttl,
            state: RwLock::new(CacheState::NotLoaded),
        }
    }

    /// 无简报
    pub fn none() -> Self {
        Self {
            source: None,
            ttl: Duration::ZERO,
            state: RwLock::new(CacheState::NotLoaded),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(*self.state.read().await, CacheState::Loaded { .. })
    }

    /// 取简报文本；过期或未加载时重新加载
    pub async fn get(&self) -> String {
        let Some(source) = &self.source else {
            return String::new();
        };

        if let CacheState::Loaded { text, at } = &*self.state.read().await {
            if at.elapsed() < self.ttl {
                return text.clone();
            }
        }

        let mut state = self.state.write().await;
        // 等锁期间可能已被其他轮次刷新
        if let CacheState::Loaded { text, at } = &*state {
            if at.elapsed() < self.ttl {
                return text.clone();
            }
        }

        let text = match source.load().await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!("Domain briefing unavailable: {}", e);
                String::new()
            }
        };
        *state = CacheState::Loaded {
            text: text.clone(),
            at: Instant::now(),
        };
        text
    }
}

impl Default for DomainBriefing {
    fn default() -> Self {
        Self::none()
    }
}

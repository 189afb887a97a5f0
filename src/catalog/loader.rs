//! 目录加载器：解析 sources.toml

use std::path::Path;

use serde::Deserialize;

use super::{CatalogError, SourceDefinition};

#[derive(Debug, Deserialize)]
struct CatalogToml {
    #[serde(default, rename = "source")]
    sources: Vec<SourceDefinition>,
}

/// 解析 TOML 文本为数据源列表（未校验）
pub fn parse_catalog(content: &str) -> Result<Vec<SourceDefinition>, CatalogError> {
    let parsed: CatalogToml = toml::from_str(content)?;
    Ok(parsed.sources)
}

/// 从文件加载数据源列表；文件不存在时返回空列表
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<SourceDefinition>, CatalogError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Catalog file not found, starting with empty catalog");
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let sources = parse_catalog(&content)?;
    tracing::info!("Loaded {} sources from {}", sources.len(), path.display());
    Ok(sources)
}

//! 搜索词目录
//!
//! 默认目录内置在代码中；也可以通过 TOML 文件（`terms = [...]`）覆盖。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use crate::models::SearchTerm;

/// 内置搜索词：故意撒大网，由过滤器收窄
const DEFAULT_TERMS: &[&str] = &[
    // 绘图 / 设计岗位
    "electrical designer",
    "electrical drafter",
    "electrical design technician",
    "CAD designer",
    "CAD drafter",
    "CAD technician",
    "CAD operator",
    "AutoCAD drafter",
    "AutoCAD designer",
    "AutoCAD operator",
    // 技术员 / 助理
    "design technician",
    "drafting technician",
    "engineering technician electrical",
    "design assistant",
    "drafting assistant",
    // 协调 / 专员
    "design coordinator",
    "CAD coordinator",
    "electrical detailer",
    // BIM
    "BIM modeler",
    "BIM technician",
    // 报建图纸
    "permit designer",
    "plans designer",
    // 光伏专用
    "solar designer",
    "solar drafter",
    "solar engineer",
    "solar design engineer",
    "PV designer",
    "PV engineer",
    "PV design engineer",
    "PV system designer",
    "photovoltaic designer",
    "photovoltaic engineer",
    "solar permit designer",
    "solar plans designer",
    // 工具名（命中职位描述）
    "helioscope",
    "aurora solar",
    "PVsyst",
    "PV production modeling",
    "solar production modeling",
    "solaredge designer",
    // 具体工作内容
    "string sizing solar",
    "stringing diagram",
    "module layout solar",
    "panel layout solar",
    "array layout solar",
    "single line diagram solar",
    "one-line diagram solar",
    "permit set solar",
    "plan set solar",
    "construction drawings solar",
    "wire schedule solar",
    "conduit schedule solar",
    // 场景
    "residential solar",
    "commercial solar",
    "utility scale solar",
    "rooftop solar",
    // 储能
    "battery storage engineer",
    "energy storage engineer",
    "battery storage designer",
    "BESS engineer",
    "BESS designer",
    // 可再生能源
    "renewables engineer",
    "renewables designer",
    "renewable energy engineer",
    "renewable energy designer",
];

#[derive(Debug, Deserialize)]
struct CatalogFile {
    terms: Vec<String>,
}

/// 内置目录
pub fn default_catalog() -> Vec<SearchTerm> {
    DEFAULT_TERMS.iter().map(|t| SearchTerm::new(*t)).collect()
}

/// 加载搜索词目录
///
/// # 参数
/// - `path`: TOML 文件路径；为 `None` 时使用内置目录
///
/// # 返回
/// 返回按文件顺序排列的搜索词（去掉空白项）
pub async fn load_catalog(path: Option<&Path>) -> Result<Vec<SearchTerm>> {
    let Some(path) = path else {
        return Ok(default_catalog());
    };

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取搜索词文件: {}", path.display()))?;

    parse_catalog(&content).with_context(|| format!("无法解析搜索词文件: {}", path.display()))
}

fn parse_catalog(content: &str) -> Result<Vec<SearchTerm>> {
    let file: CatalogFile = toml::from_str(content)?;
    let terms: Vec<SearchTerm> = file
        .terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(SearchTerm::new)
        .collect();

    if terms.is_empty() {
        anyhow::bail!("搜索词目录为空");
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_non_empty_and_keeps_order() {
        let terms = default_catalog();
        assert_eq!(terms.len(), DEFAULT_TERMS.len());
        assert_eq!(terms[0].as_str(), "electrical designer");
        assert_eq!(terms.last().map(|t| t.as_str()), Some("renewable energy designer"));
    }

    #[test]
    fn parse_catalog_skips_blank_terms() {
        let terms = parse_catalog("terms = [\"solar designer\", \"  \", \"PV engineer\"]").unwrap();
        let names: Vec<&str> = terms.iter().map(|t| t.as_str()).collect();
        assert_eq!(names, vec!["solar designer", "PV engineer"]);
    }

    #[test]
    fn parse_catalog_rejects_empty_list() {
        assert!(parse_catalog("terms = []").is_err());
    }

    #[tokio::test]
    async fn load_catalog_without_path_uses_default() {
        let terms = load_catalog(None).await.unwrap();
        assert_eq!(terms, default_catalog());
    }

    #[test]
    fn load_catalog_reports_missing_file() {
        let result = tokio_test::block_on(load_catalog(Some(Path::new("no/such/terms.toml"))));
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("no/such/terms.toml"));
    }
}

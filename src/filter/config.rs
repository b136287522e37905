//! 规则配置 - 评分引擎的输入
//!
//! 配置在运行开始时加载一次，之后只读共享。加载时先在原始 JSON 上检查
//! 必需的键，缺失时立即报错（不静默使用默认值），然后再反序列化为强类型结构。
//! 所有模式串在加载时统一转为小写，匹配时按子串比较。

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::error::ConfigError;

/// 唯一的阈值默认值
pub const DEFAULT_THRESHOLD: f64 = 50.0;

/// 标题窗口长度（描述前 200 个字符）
pub const TITLE_WINDOW_CHARS: usize = 200;

/// 规则配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub company_blocklist: Vec<String>,
    pub required_context: RequiredContext,
    /// 按配置文件中的顺序排列
    #[serde(deserialize_with = "deserialize_ordered_exclusions")]
    pub exclusions: Vec<ExclusionCategory>,
    #[serde(default)]
    pub design_role_indicators: Vec<String>,
    pub positive_signals: PositiveSignals,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequiredContext {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// 排除类别的检查范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckArea {
    /// 整个描述
    #[default]
    Description,
    /// 描述开头的标题窗口
    Title,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExclusionCategory {
    /// 配置中的键名，在反序列化后填入
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub check_area: CheckArea,
    pub patterns: Vec<String>,
}

/// 单一模式族的加分层
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatternTier {
    pub weight: f64,
    #[serde(default)]
    pub description: String,
    pub patterns: Vec<String>,
}

/// 第 3 层：CAD 工具 + 项目类型 + 设计岗位
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CadProjectTier {
    pub weight: f64,
    #[serde(default)]
    pub description: String,
    pub patterns_cad: Vec<String>,
    pub patterns_project: Vec<String>,
}

/// 第 5 层：CAD 工具 + 设计岗位
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CadDesignTier {
    pub weight: f64,
    #[serde(default)]
    pub description: String,
    pub patterns_cad: Vec<String>,
}

/// 六个加分层，缺省的层不加分
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PositiveSignals {
    #[serde(default)]
    pub tier1_tools: Option<PatternTier>,
    #[serde(default)]
    pub tier2_strong: Option<PatternTier>,
    #[serde(default)]
    pub tier3_cad_project: Option<CadProjectTier>,
    #[serde(default)]
    pub tier4_title: Option<PatternTier>,
    #[serde(default)]
    pub tier5_cad_design: Option<CadDesignTier>,
    #[serde(default)]
    pub tier6_design_titles: Option<PatternTier>,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl RuleConfig {
    /// 从文件加载规则配置
    ///
    /// # 参数
    /// - `path`: JSON 配置文件路径
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::ReadFailed {
                path: display.clone(),
                source,
            })?;
        Self::parse(&content, &display)
    }

    /// 从 JSON 字符串解析（测试与内嵌配置使用）
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    /// 校验必需键并转换为强类型配置
    pub fn from_value(raw: Value) -> Result<Self, ConfigError> {
        validate_required_keys(&raw, "<inline>")?;

        let config: RuleConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::InvalidShape {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?;
        Ok(config.normalized())
    }

    /// 原始 JSON 只用于检查必需键，强类型结构直接从文本反序列化，排除类别保持文档顺序
    fn parse(content: &str, path: &str) -> Result<Self, ConfigError> {
        let raw: Value =
            serde_json::from_str(content).map_err(|source| ConfigError::JsonParseFailed {
                path: path.to_string(),
                source,
            })?;
        validate_required_keys(&raw, path)?;

        let config: RuleConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::InvalidShape {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// 模式串统一小写，去掉空串
    fn normalize(&mut self) {
        lower_all(&mut self.company_blocklist);
        lower_all(&mut self.required_context.patterns);
        lower_all(&mut self.design_role_indicators);
        for category in &mut self.exclusions {
            lower_all(&mut category.patterns);
        }

        let signals = &mut self.positive_signals;
        for tier in [
            signals.tier1_tools.as_mut(),
            signals.tier2_strong.as_mut(),
            signals.tier4_title.as_mut(),
            signals.tier6_design_titles.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            lower_all(&mut tier.patterns);
        }
        if let Some(tier) = signals.tier3_cad_project.as_mut() {
            lower_all(&mut tier.patterns_cad);
            lower_all(&mut tier.patterns_project);
        }
        if let Some(tier) = signals.tier5_cad_design.as_mut() {
            lower_all(&mut tier.patterns_cad);
        }
    }
}

fn lower_all(patterns: &mut Vec<String>) {
    patterns.retain(|p| !p.trim().is_empty());
    for pattern in patterns.iter_mut() {
        *pattern = pattern.to_lowercase();
    }
}

/// 必需键：company_blocklist、required_context.patterns、exclusions、positive_signals
fn validate_required_keys(raw: &Value, path: &str) -> Result<(), ConfigError> {
    let root = raw.as_object().ok_or_else(|| ConfigError::InvalidShape {
        path: path.to_string(),
        message: "顶层必须是 JSON 对象".to_string(),
    })?;

    for key in ["company_blocklist", "required_context", "exclusions", "positive_signals"] {
        if !root.contains_key(key) {
            return Err(ConfigError::missing_key(key));
        }
    }

    let has_patterns = root
        .get("required_context")
        .and_then(Value::as_object)
        .is_some_and(|ctx| ctx.contains_key("patterns"));
    if !has_patterns {
        return Err(ConfigError::missing_key("required_context.patterns"));
    }

    Ok(())
}

/// 按文档顺序读取排除类别
fn deserialize_ordered_exclusions<'de, D>(deserializer: D) -> Result<Vec<ExclusionCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Vec<ExclusionCategory>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of exclusion categories")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut categories = Vec::new();
            while let Some((name, mut category)) = map.next_entry::<String, ExclusionCategory>()? {
                category.name = name;
                categories.push(category);
            }
            Ok(categories)
        }
    }

    deserializer.deserialize_map(OrderedVisitor)
}

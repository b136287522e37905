//! 职位数据模型
//!
//! `Posting` 由站点抓取器创建，创建后不可变；评分引擎和结果处理器只读使用。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 搜索关键词（职位名或技能词）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(term: impl Into<String>) -> Self {
        Self(term.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SearchTerm {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 招聘站点标识
///
/// 枚举顺序即默认的站点尝试顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    Indeed,
    Linkedin,
    ZipRecruiter,
    Glassdoor,
}

impl SourceName {
    pub const ALL: [SourceName; 4] = [
        SourceName::Indeed,
        SourceName::Linkedin,
        SourceName::ZipRecruiter,
        SourceName::Glassdoor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Indeed => "indeed",
            SourceName::Linkedin => "linkedin",
            SourceName::ZipRecruiter => "zip_recruiter",
            SourceName::Glassdoor => "glassdoor",
        }
    }

    /// 需要浏览器会话的站点（会弹出人机验证页）
    pub fn requires_browser(&self) -> bool {
        matches!(self, SourceName::ZipRecruiter | SourceName::Glassdoor)
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条抓取到的职位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    /// 可能为空（部分站点只返回列表信息）
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    pub source: SourceName,
    pub search_term: SearchTerm,
}

impl Posting {
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

//! 浏览器站点配置（ZipRecruiter、Glassdoor）
//!
//! 每个站点的搜索地址、职位卡片选择器、字段选择器和详情页描述选择器。
//! 选择器按优先级排列，第一个命中的生效。

use serde::Deserialize;

use crate::models::{Posting, SearchTerm, SourceName};
use crate::utils::clip;

/// 描述最大字符数
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

/// 有效描述的最小长度
pub const MIN_DESCRIPTION_CHARS: usize = 50;

/// 每次搜索最多抓取的详情页数量
pub const MAX_DESCRIPTION_FETCHES: usize = 10;

/// 站点配置
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub source: SourceName,
    /// 用于补全相对链接
    pub origin: &'static str,
    search_template: &'static str,
    pub card_selectors: &'static [&'static str],
    pub title_selectors: &'static [&'static str],
    pub company_selectors: &'static [&'static str],
    pub location_selectors: &'static [&'static str],
    /// 卡片 id 前缀与职位页地址前缀，没有链接时用 id 拼出地址
    pub card_id_link: Option<(&'static str, &'static str)>,
    pub description_selectors: &'static [&'static str],
    /// 每页最多处理的卡片数
    pub max_cards: usize,
}

/// 卡片中提取的字段
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CardFields {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub id: String,
}

impl SiteProfile {
    pub fn ziprecruiter() -> Self {
        Self {
            source: SourceName::ZipRecruiter,
            origin: "https://www.ziprecruiter.com",
            search_template:
                "https://www.ziprecruiter.com/jobs-search?search={term}&location={location}&page=1",
            card_selectors: &[
                r#"article[id^="job-card-"]"#,
                r#"article[data-testid="job-card"]"#,
                r#"div[data-testid="job-card"]"#,
                "article.job_result",
                ".job_result_item",
                ".job-listing",
                r#"div[class*="JobCard"]"#,
                r#"li[class*="job"]"#,
            ],
            title_selectors: &[
                "h2",
                r#"a[data-testid="job-card-title"]"#,
                "h2 a",
                ".job_title a",
            ],
            company_selectors: &[
                r#"a[data-testid="job-card-company"]"#,
                r#"a[data-testid="employer-name"]"#,
                "a.company_name",
            ],
            location_selectors: &[
                r#"a[data-testid="job-card-location"]"#,
                r#"p[data-testid="job-card-location"]"#,
                "span.job_location",
            ],
            card_id_link: Some(("job-card-", "https://www.ziprecruiter.com/jobs/")),
            description_selectors: &[
                r#"[class*="job_description"]"#,
                r#"[data-testid="job-description"]"#,
                ".jobDescriptionSection",
                "#job-description",
                r#"[class*="Description"]"#,
                r#"div[class*="description"]"#,
            ],
            max_cards: 50,
        }
    }

    pub fn glassdoor() -> Self {
        Self {
            source: SourceName::Glassdoor,
            origin: "https://www.glassdoor.com",
            search_template:
                "https://www.glassdoor.com/Job/jobs.htm?sc.keyword={term}&locT=N&locId=1",
            card_selectors: &[r#"[data-test="jobListing"]"#],
            title_selectors: &[r#"a[data-test="job-title"]"#],
            company_selectors: &[
                r#"span[class*="compactEmployerName"]"#,
                r#"[data-test="employer-name"]"#,
                r#"span[class*="EmployerName"]"#,
            ],
            location_selectors: &[r#"[data-test="emp-location"]"#],
            card_id_link: None,
            // jobDescription 必须在前，宽泛的选择器会带上整个详情面板
            description_selectors: &[
                r#"[class*="jobDescription"]"#,
                r#"[data-test="jobDescription"]"#,
                ".jobDescriptionContent",
                ".desc",
                r#"[class*="description"]"#,
            ],
            max_cards: 30,
        }
    }

    /// 需要浏览器的站点才有配置
    pub fn for_source(source: SourceName) -> Option<Self> {
        match source {
            SourceName::ZipRecruiter => Some(Self::ziprecruiter()),
            SourceName::Glassdoor => Some(Self::glassdoor()),
            SourceName::Indeed | SourceName::Linkedin => None,
        }
    }

    /// 搜索结果页地址，空格编码为 `+`
    pub fn search_url(&self, term: &SearchTerm, location: &str) -> String {
        self.search_template
            .replace("{term}", &encode_query(term.as_str()))
            .replace("{location}", &encode_query(location))
    }

    /// 所有卡片选择器合并，供挑战处理器判断目标内容是否出现
    pub fn target_selector(&self) -> String {
        self.card_selectors.join(", ")
    }

    /// 补全相对链接
    pub fn absolute_url(&self, href: &str) -> String {
        if href.starts_with('/') {
            format!("{}{}", self.origin, href)
        } else {
            href.to_string()
        }
    }

    /// 提取卡片字段的 JS 脚本
    ///
    /// # 参数
    /// - `card_selector`: 已命中的卡片选择器
    pub fn card_script(&self, card_selector: &str) -> String {
        format!(
            r#"(() => {{
    const pick = (card, selectors) => {{
        for (const sel of selectors) {{
            const el = card.querySelector(sel);
            if (el) return {{ text: (el.innerText || '').trim(), href: el.getAttribute('href') || '' }};
        }}
        return {{ text: '', href: '' }};
    }};
    const cards = Array.from(document.querySelectorAll({card})).slice(0, {max});
    return cards.map(card => {{
        const title = pick(card, {titles});
        return {{
            title: title.text,
            href: title.href,
            company: pick(card, {companies}).text,
            location: pick(card, {locations}).text,
            id: card.id || ''
        }};
    }});
}})()"#,
            card = js_literal(card_selector),
            max = self.max_cards,
            titles = js_list(self.title_selectors),
            companies = js_list(self.company_selectors),
            locations = js_list(self.location_selectors),
        )
    }

    /// 卡片字段转职位，缺少标题或公司时丢弃
    pub fn posting_from_card(&self, card: CardFields, term: &SearchTerm) -> Option<Posting> {
        let title = card.title.trim();
        let company = card.company.trim();
        if title.is_empty() || company.is_empty() {
            return None;
        }

        let mut url = self.absolute_url(card.href.trim());
        if url.is_empty() {
            if let Some((prefix, base)) = self.card_id_link {
                if let Some(job_id) = card.id.strip_prefix(prefix) {
                    url = format!("{}{}", base, job_id);
                }
            }
        }

        Some(Posting {
            title: title.to_string(),
            company: company.to_string(),
            location: card.location.trim().to_string(),
            description: String::new(),
            url,
            source: self.source,
            search_term: term.clone(),
        })
    }
}

/// 清洗详情页描述：去空白并截断，过短视为无效
pub fn normalize_description(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MIN_DESCRIPTION_CHARS {
        return None;
    }
    Some(clip(trimmed, MAX_DESCRIPTION_CHARS))
}

fn encode_query(text: &str) -> String {
    urlencoding::encode(text).replace("%20", "+")
}

fn js_literal(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn js_list(items: &[&str]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

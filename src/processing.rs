//! 结果处理模块
//!
//! 把合格职位按公司去重成线索（每家公司一行），附上置信度、域名猜测和外联搜索链接

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::info;

use crate::filter::ScoringResult;
use crate::models::Posting;

/// 置信度上限
pub const MAX_CONFIDENCE: f64 = 100.0;

const GOOGLE_SEARCH: &str = "https://www.google.com/search?q=";

/// 一条销售线索，字段顺序即导出列顺序
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lead {
    pub company: String,
    pub domain: String,
    pub job_title: String,
    pub location: String,
    pub confidence_score: f64,
    pub posting_url: String,
    pub linkedin_managers: String,
    pub linkedin_hiring: String,
    pub linkedin_role: String,
    pub google_enduser: String,
    pub date_scraped: String,
}

// ========== 公司名与域名 ==========

fn suffix_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s*(LLC|Inc\.?|Corp\.?|Co\.?|Ltd\.?|L\.L\.C\.?|INC|CORP)\.?\s*$").ok()
    })
    .as_ref()
}

fn punctuation_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").ok()).as_ref()
}

fn whitespace_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").ok()).as_ref()
}

fn strip(re: Option<&Regex>, text: &str) -> String {
    match re {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// 去掉公司名末尾的法律后缀和标点
///
/// `"Sunrun Inc."` → `"Sunrun"`，`"Acme Solar, LLC"` → `"Acme Solar"`
pub fn clean_company_name(name: &str) -> String {
    let without_suffix = strip(suffix_regex(), name);
    strip(punctuation_regex(), &without_suffix).trim().to_string()
}

/// 猜测公司域名：清洗后的名字去空白、转小写加 `.com`，清洗后为空时返回空串
pub fn guess_domain(company: &str) -> String {
    let cleaned = clean_company_name(company);
    if cleaned.is_empty() {
        return String::new();
    }
    format!("{}.com", strip(whitespace_regex(), &cleaned.to_lowercase()))
}

/// 去重用的公司键
fn company_key(company: &str) -> String {
    let cleaned = clean_company_name(company);
    if cleaned.is_empty() {
        company.trim().to_lowercase()
    } else {
        cleaned.to_lowercase()
    }
}

// ========== 外联搜索链接 ==========

fn google_search(query: &str) -> String {
    format!(
        "{}{}",
        GOOGLE_SEARCH,
        urlencoding::encode(query).replace("%2F", "/")
    )
}

/// 公司内的经理、总监
pub fn managers_search_url(company: &str) -> String {
    google_search(&format!(
        r#"site:linkedin.com/in/ "{}" (solar OR design OR engineering) (manager OR director OR lead)"#,
        clean_company_name(company)
    ))
}

/// 公司内的招聘人员
pub fn hiring_search_url(company: &str) -> String {
    google_search(&format!(
        r#"site:linkedin.com/in/ "{}" (recruiter OR "talent acquisition" OR "hiring manager" OR HR OR "human resources")"#,
        clean_company_name(company)
    ))
}

/// 公司内担任该职位的人
pub fn role_search_url(company: &str, job_title: &str) -> String {
    google_search(&format!(
        r#"site:linkedin.com/in/ "{}" "{}""#,
        clean_company_name(company),
        strip(punctuation_regex(), job_title)
    ))
}

/// 公司内设计软件的实际使用者
pub fn enduser_search_url(company: &str) -> String {
    google_search(&format!(
        r#"site:linkedin.com/in/ "{}" (designer OR drafter OR "CAD technician" OR "design engineer" OR AutoCAD OR "solar design")"#,
        clean_company_name(company)
    ))
}

// ========== 去重 ==========

/// 合格职位去重成线索
///
/// # 参数
/// - `qualified`: 合格职位及其评分结果
/// - `date`: 抓取日期
///
/// # 返回
/// 每家公司一条线索，按置信度降序；同分时保持输入顺序
pub fn build_leads(qualified: &[(Posting, ScoringResult)], date: NaiveDate) -> Vec<Lead> {
    let mut ranked: Vec<(&Posting, f64)> = qualified
        .iter()
        .filter(|(posting, _)| !posting.company.trim().is_empty())
        .map(|(posting, result)| (posting, result.score.min(MAX_CONFIDENCE)))
        .collect();
    // 稳定排序，同分保持先到先得
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let date_scraped = date.format("%Y-%m-%d").to_string();
    let mut seen = HashSet::new();
    let leads: Vec<Lead> = ranked
        .into_iter()
        .filter(|(posting, _)| seen.insert(company_key(&posting.company)))
        .map(|(posting, confidence)| {
            let company = posting.company.trim().to_string();
            Lead {
                domain: guess_domain(&company),
                job_title: posting.title.clone(),
                location: posting.location.clone(),
                confidence_score: confidence,
                posting_url: posting.url.clone(),
                linkedin_managers: managers_search_url(&company),
                linkedin_hiring: hiring_search_url(&company),
                linkedin_role: role_search_url(&company, &posting.title),
                google_enduser: enduser_search_url(&company),
                date_scraped: date_scraped.clone(),
                company,
            }
        })
        .collect();

    info!("🏢 去重后公司数: {}", leads.len());
    leads
}

//! 站点抓取器
//!
//! 每个招聘站点一个适配器，对一个搜索词执行一次搜索：
//! - 低门槛站点走搜索 API（[`ApiSiteFetcher`]）
//! - 有验证挑战的站点走浏览器会话并调用挑战处理器（[`BrowserSiteFetcher`]）
//!
//! 抓取器本身不重试、不计数，重试和统计都由编排器负责。

pub mod api_fetcher;
pub mod browser_fetcher;
pub mod profiles;
pub mod search_api;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::error::FetchError;
use crate::models::{Posting, SearchTerm, SourceName};

pub use api_fetcher::ApiSiteFetcher;
pub use browser_fetcher::{BrowserFetchSettings, BrowserSiteFetcher};
pub use profiles::SiteProfile;
pub use search_api::{HttpSearchApi, SearchCapability, SearchRequest};

/// 一次抓取的诊断信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchDiagnostics {
    pub challenge_detected: bool,
    pub challenge_solved: Option<bool>,
    pub selector_matched: Option<String>,
    pub selectors_tried: Vec<String>,
    pub page_title: Option<String>,
    pub http_status: Option<u16>,
}

/// 一次成功抓取的结果（职位可以为空）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub postings: Vec<Posting>,
    pub diagnostics: FetchDiagnostics,
}

impl FetchOutcome {
    pub fn new(postings: Vec<Posting>) -> Self {
        Self {
            postings,
            diagnostics: FetchDiagnostics::default(),
        }
    }
}

/// 站点抓取能力
#[async_trait]
pub trait SiteFetcher: Send + Sync {
    /// 站点标识
    fn source(&self) -> SourceName;

    /// 是否需要浏览器会话
    fn requires_browser(&self) -> bool {
        self.source().requires_browser()
    }

    /// 对一个搜索词执行一次搜索
    async fn fetch(&self, term: &SearchTerm) -> Result<FetchOutcome, FetchError>;
}

/// 常见浏览器的 User-Agent，每个搜索词随机取一个
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// 随机选一个 User-Agent
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

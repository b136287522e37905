//! 浏览器站点抓取器（ZipRecruiter、Glassdoor）
//!
//! 每次抓取开一个新页面，用完即关：
//! 导航 → 挑战处理 → 清理弹窗 → 匹配卡片选择器 → 提取卡片 → 抓取详情页描述

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::profiles::{normalize_description, CardFields, SiteProfile, MAX_DESCRIPTION_FETCHES};
use super::{random_user_agent, FetchDiagnostics, FetchOutcome, SiteFetcher};
use crate::browser::{dismiss_popups, eval_as, BrowserSession, DriverError, PageDriver};
use crate::challenge::ChallengeResolver;
use crate::error::FetchError;
use crate::models::{Posting, SearchTerm, SourceName};
use crate::utils::truncate_text;

/// 没有卡片时提示被封锁的页面文字（小写）
const BLOCK_PAGE_MARKERS: &[&str] = &["access denied", "captcha"];

/// 浏览器抓取参数
#[derive(Debug, Clone)]
pub struct BrowserFetchSettings {
    pub location: String,
    pub navigation_timeout: Duration,
    /// 搜索页加载后的等待
    pub page_settle: Duration,
    /// 详情页加载后的等待
    pub detail_settle: Duration,
    /// 两个详情页之间的间隔
    pub detail_gap: Duration,
    pub popup_pause: Duration,
    pub max_descriptions: usize,
}

impl Default for BrowserFetchSettings {
    fn default() -> Self {
        Self {
            location: "USA".to_string(),
            navigation_timeout: Duration::from_secs(30),
            page_settle: Duration::from_secs(3),
            detail_settle: Duration::from_secs(2),
            detail_gap: Duration::from_secs(1),
            popup_pause: Duration::from_millis(200),
            max_descriptions: MAX_DESCRIPTION_FETCHES,
        }
    }
}

impl BrowserFetchSettings {
    /// 无等待（测试用）
    pub fn immediate() -> Self {
        Self {
            page_settle: Duration::ZERO,
            detail_settle: Duration::ZERO,
            detail_gap: Duration::ZERO,
            popup_pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// 通过浏览器会话抓取一个站点
pub struct BrowserSiteFetcher {
    profile: SiteProfile,
    session: Arc<dyn BrowserSession>,
    resolver: Arc<ChallengeResolver>,
    settings: BrowserFetchSettings,
}

impl BrowserSiteFetcher {
    pub fn new(
        profile: SiteProfile,
        session: Arc<dyn BrowserSession>,
        resolver: Arc<ChallengeResolver>,
        settings: BrowserFetchSettings,
    ) -> Self {
        Self {
            profile,
            session,
            resolver,
            settings,
        }
    }

    async fn scrape(
        &self,
        page: &dyn PageDriver,
        term: &SearchTerm,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<Vec<Posting>, FetchError> {
        let tag = self.profile.source;
        let url = self.profile.search_url(term, &self.settings.location);
        debug!("[{}] 打开 {}", tag, url);

        page.goto(&url, self.settings.navigation_timeout)
            .await
            .map_err(fetch_error)?;
        sleep(self.settings.page_settle).await;

        // ========== 验证挑战 ==========
        let report = self
            .resolver
            .resolve(page, &self.profile.target_selector())
            .await;
        diagnostics.challenge_detected = report.detected;
        diagnostics.challenge_solved = report.solved();
        if !report.is_success() {
            warn!("  [{}] 无法通过验证: '{}'", tag, term);
            return Err(FetchError::ChallengeUnsolved {
                rounds: report.rounds,
            });
        }

        dismiss_popups(page, self.settings.popup_pause).await;
        diagnostics.page_title = page.title().await.ok().filter(|t| !t.is_empty());

        // ========== 职位卡片 ==========
        let Some(card_selector) = self.match_card_selector(page, diagnostics).await else {
            let content = page.content().await.unwrap_or_default().to_lowercase();
            if let Some(marker) = BLOCK_PAGE_MARKERS.iter().find(|m| content.contains(*m)) {
                return Err(FetchError::Other(format!("{} ({})", marker, tag)));
            }
            info!(
                "  [{}] 未找到职位卡片 (标题: {})",
                tag,
                truncate_text(diagnostics.page_title.as_deref().unwrap_or(""), 50)
            );
            return Ok(Vec::new());
        };

        let cards: Vec<CardFields> = eval_as(page, &self.profile.card_script(&card_selector))
            .await
            .map_err(|e| FetchError::Parse(format!("职位卡片提取失败: {}", e)))?;
        let mut postings: Vec<Posting> = cards
            .into_iter()
            .filter_map(|card| self.profile.posting_from_card(card, term))
            .collect();
        info!(
            "  [{}] 通过 '{}' 找到 {} 个职位",
            tag,
            card_selector,
            postings.len()
        );

        // ========== 详情页描述 ==========
        let to_fetch = postings.len().min(self.settings.max_descriptions);
        if to_fetch > 0 {
            debug!("[{}] 抓取 {} 个职位描述", tag, to_fetch);
        }
        for posting in postings.iter_mut().take(to_fetch) {
            if posting.url.is_empty() {
                continue;
            }
            if let Some(description) = self.fetch_description(page, &posting.url).await {
                posting.description = description;
            }
            sleep(self.settings.detail_gap).await;
        }

        Ok(postings)
    }

    /// 依次尝试卡片选择器，记录尝试过的和命中的
    async fn match_card_selector(
        &self,
        page: &dyn PageDriver,
        diagnostics: &mut FetchDiagnostics,
    ) -> Option<String> {
        for selector in self.profile.card_selectors {
            diagnostics.selectors_tried.push(selector.to_string());
            if page.count(selector).await.unwrap_or(0) > 0 {
                diagnostics.selector_matched = Some(selector.to_string());
                return Some(selector.to_string());
            }
        }
        None
    }

    /// 打开详情页读取描述，失败返回 None
    async fn fetch_description(&self, page: &dyn PageDriver, url: &str) -> Option<String> {
        if let Err(e) = page.goto(url, self.settings.navigation_timeout).await {
            debug!("描述页打开失败 {}: {}", truncate_text(url, 50), e);
            return None;
        }
        sleep(self.settings.detail_settle).await;
        dismiss_popups(page, self.settings.popup_pause).await;

        for selector in self.profile.description_selectors {
            let Ok(elements) = page.query_all(selector).await else {
                continue;
            };
            if let Some(description) = elements.first().and_then(|e| normalize_description(&e.text)) {
                return Some(description);
            }
        }

        debug!(
            "未找到描述: {}",
            truncate_text(&page.title().await.unwrap_or_default(), 60)
        );
        None
    }
}

#[async_trait]
impl SiteFetcher for BrowserSiteFetcher {
    fn source(&self) -> SourceName {
        self.profile.source
    }

    fn requires_browser(&self) -> bool {
        true
    }

    async fn fetch(&self, term: &SearchTerm) -> Result<FetchOutcome, FetchError> {
        let page = self
            .session
            .new_page(Some(random_user_agent()))
            .await
            .map_err(fetch_error)?;

        let mut diagnostics = FetchDiagnostics::default();
        let result = self.scrape(page.as_ref(), term, &mut diagnostics).await;

        if let Err(e) = page.close().await {
            debug!("关闭页面失败: {}", e);
        }

        result.map(|postings| FetchOutcome {
            postings,
            diagnostics,
        })
    }
}

fn fetch_error(e: DriverError) -> FetchError {
    match e {
        DriverError::Timeout(message) => FetchError::Timeout(message),
        DriverError::Navigation(message) | DriverError::Protocol(message) => {
            FetchError::Browser(message)
        }
    }
}

//! 搜索 API 站点抓取器（Indeed、LinkedIn）

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::search_api::{SearchCapability, SearchRequest};
use super::{random_user_agent, FetchOutcome, SiteFetcher};
use crate::error::FetchError;
use crate::models::{SearchTerm, SourceName};

/// 通过搜索服务抓取一个站点
pub struct ApiSiteFetcher {
    source: SourceName,
    api: Arc<dyn SearchCapability>,
    location: String,
    results_wanted: u32,
    proxies: Vec<String>,
}

impl ApiSiteFetcher {
    pub fn new(
        source: SourceName,
        api: Arc<dyn SearchCapability>,
        location: impl Into<String>,
        results_wanted: u32,
    ) -> Self {
        Self {
            source,
            api,
            location: location.into(),
            results_wanted,
            proxies: Vec::new(),
        }
    }

    pub fn with_proxies(mut self, proxies: Vec<String>) -> Self {
        self.proxies = proxies;
        self
    }

    /// 构造一次搜索请求，User-Agent 随机选取
    pub fn request_for(&self, term: &SearchTerm) -> SearchRequest {
        SearchRequest {
            site: self.source,
            search_term: term.clone(),
            location: self.location.clone(),
            results_wanted: self.results_wanted,
            proxies: self.proxies.clone(),
            user_agent: random_user_agent().to_string(),
        }
    }
}

#[async_trait]
impl SiteFetcher for ApiSiteFetcher {
    fn source(&self) -> SourceName {
        self.source
    }

    fn requires_browser(&self) -> bool {
        false
    }

    async fn fetch(&self, term: &SearchTerm) -> Result<FetchOutcome, FetchError> {
        let request = self.request_for(term);
        let postings = self.api.search(&request).await?;
        info!("  [{}] 找到 {} 个职位", self.source, postings.len());
        Ok(FetchOutcome::new(postings))
    }
}

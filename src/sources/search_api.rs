//! 职位搜索 API 客户端
//!
//! 低门槛站点（Indeed、LinkedIn）通过外部搜索服务获取职位，
//! 本模块只负责请求和响应映射。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::models::{Posting, SearchTerm, SourceName};
use crate::utils::{clip, mask_credentials};

/// 错误响应正文保留的字符数
const MAX_ERROR_BODY: usize = 200;

/// 一次搜索请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub site: SourceName,
    pub search_term: SearchTerm,
    pub location: String,
    pub results_wanted: u32,
    /// 原样透传给搜索服务
    pub proxies: Vec<String>,
    pub user_agent: String,
}

/// 搜索能力
#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Posting>, FetchError>;
}

/// 搜索服务返回的职位
#[derive(Debug, Default, Deserialize)]
struct ApiJob {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "job_url")]
    url: Option<String>,
}

impl ApiJob {
    fn into_posting(self, source: SourceName, term: &SearchTerm) -> Posting {
        Posting {
            title: self.title.unwrap_or_default().trim().to_string(),
            company: self.company.unwrap_or_default().trim().to_string(),
            location: self.location.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            source,
            search_term: term.clone(),
        }
    }
}

/// 基于 reqwest 的搜索服务客户端
pub struct HttpSearchApi {
    client: Client,
    base_url: String,
}

impl HttpSearchApi {
    /// 创建客户端
    ///
    /// # 参数
    /// - `base_url`: 搜索服务地址，请求发往 `<base_url>/search`
    /// - `timeout`: 单次请求超时
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Other(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SearchCapability for HttpSearchApi {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Posting>, FetchError> {
        debug!(
            "[{}] POST {} (proxies: {})",
            request.site,
            self.endpoint(),
            mask_credentials(&request.proxies.join(","))
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::http(
                status.as_u16(),
                clip(body.trim(), MAX_ERROR_BODY),
            ));
        }

        let jobs: Vec<ApiJob> = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("搜索结果解析失败: {}", e)))?;

        Ok(jobs
            .into_iter()
            .map(|job| job.into_posting(request.site, &request.search_term))
            .collect())
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchError {
    let message = mask_credentials(&e.to_string());
    if e.is_timeout() {
        FetchError::Timeout(message)
    } else if e.is_connect() {
        FetchError::Connection(message)
    } else if let Some(status) = e.status() {
        FetchError::http(status.as_u16(), message)
    } else {
        FetchError::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_shape() {
        let request = SearchRequest {
            site: SourceName::Linkedin,
            search_term: SearchTerm::new("solar designer"),
            location: "USA".into(),
            results_wanted: 1000,
            proxies: vec![],
            user_agent: "UA".into(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "site": "linkedin",
                "search_term": "solar designer",
                "location": "USA",
                "results_wanted": 1000,
                "proxies": [],
                "user_agent": "UA"
            })
        );
    }

    #[test]
    fn api_job_tolerates_nulls_and_job_url() {
        let job: ApiJob = serde_json::from_value(json!({
            "title": " PV Designer ",
            "company": null,
            "job_url": "https://example.com/job/1"
        }))
        .unwrap();
        let posting = job.into_posting(SourceName::Indeed, &SearchTerm::new("pv designer"));
        assert_eq!(posting.title, "PV Designer");
        assert_eq!(posting.company, "");
        assert_eq!(posting.url, "https://example.com/job/1");
        assert_eq!(posting.source, SourceName::Indeed);
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let api = HttpSearchApi::new("http://127.0.0.1:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.endpoint(), "http://127.0.0.1:8000/search");
    }
}

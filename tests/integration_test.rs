use std::sync::Arc;
use std::time::Duration;

use solar_leads::browser::{BrowserSession, ChromiumSession};
use solar_leads::challenge::ChallengeResolver;
use solar_leads::config::RunConfig;
use solar_leads::models::{SearchTerm, SourceName};
use solar_leads::sources::{
    ApiSiteFetcher, BrowserFetchSettings, BrowserSiteFetcher, HttpSearchApi, SiteFetcher,
    SiteProfile,
};
use solar_leads::utils::logging::init_tracing;

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_search_api_indeed() {
    // 初始化日志
    init_tracing(true);

    // 加载配置
    let config = RunConfig::from_env().expect("配置加载失败");

    let api = HttpSearchApi::new(&config.search_api_url, Duration::from_secs(180))
        .expect("创建搜索服务客户端失败");
    let fetcher = ApiSiteFetcher::new(SourceName::Indeed, Arc::new(api), "USA", 20);

    let outcome = fetcher
        .fetch(&SearchTerm::new("solar designer"))
        .await
        .expect("搜索失败");

    println!("找到 {} 个职位", outcome.postings.len());
}

#[tokio::test]
#[ignore]
async fn test_browser_connection() {
    // 初始化日志
    init_tracing(true);

    // 加载配置
    let config = RunConfig::from_env().expect("配置加载失败");

    let result = match config.browser_debug_port {
        Some(port) => ChromiumSession::connect(port).await,
        None => {
            let proxy = config.proxies.first().map(String::as_str);
            ChromiumSession::launch_headless(None, proxy).await
        }
    };

    let session = result.expect("应该能够成功连接浏览器");
    let page = session.new_page(None).await.expect("创建页面失败");
    page.close().await.expect("关闭页面失败");
}

#[tokio::test]
#[ignore]
async fn test_ziprecruiter_scrape() {
    // 初始化日志
    init_tracing(true);

    let session = ChromiumSession::launch_headless(None, None)
        .await
        .expect("启动浏览器失败");
    let fetcher = BrowserSiteFetcher::new(
        SiteProfile::ziprecruiter(),
        Arc::new(session),
        Arc::new(ChallengeResolver::default()),
        BrowserFetchSettings::default(),
    );

    let result = fetcher.fetch(&SearchTerm::new("solar designer")).await;

    match result {
        Ok(outcome) => println!(
            "找到 {} 个职位, 命中选择器: {:?}",
            outcome.postings.len(),
            outcome.diagnostics.selector_matched
        ),
        Err(e) => println!("抓取失败: {}", e),
    }
}

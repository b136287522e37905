use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::{BrowserSession, ChromiumSession};
use crate::challenge::ChallengeResolver;
use crate::config::RunConfig;
use crate::export::Exporter;
use crate::filter::{apply_filter, RuleConfig};
use crate::models::{load_catalog, SearchTerm, SourceName};
use crate::orchestrator::{self, OrchestratorSettings, RunContext, ScrapeOrchestrator};
use crate::processing::build_leads;
use crate::sources::{
    ApiSiteFetcher, BrowserFetchSettings, BrowserSiteFetcher, HttpSearchApi, SearchCapability,
    SiteFetcher, SiteProfile,
};
use crate::utils::logging::{log_startup, log_terms_loaded, print_filter_stats, print_final_stats};

/// 搜索服务单次请求超时
const SEARCH_API_TIMEOUT: Duration = Duration::from_secs(180);

/// 应用主结构
pub struct App {
    config: RunConfig,
    rules: RuleConfig,
    terms: Vec<SearchTerm>,
    fetchers: Vec<Box<dyn SiteFetcher>>,
    /// 浏览器会话，抓取器共享，运行结束后随 App 一起释放
    _browser: Option<Arc<ChromiumSession>>,
}

impl App {
    /// 初始化应用
    ///
    /// 规则配置、搜索词目录、批次参数在这里校验，任何一项失败都在抓取开始前中止。
    pub async fn initialize(config: RunConfig) -> Result<Self> {
        log_startup(config.batch, config.total_batches, config.browser_enabled);

        let rules = RuleConfig::load(&config.filter_config_path)
            .await
            .with_context(|| {
                format!("无法加载规则配置: {}", config.filter_config_path.display())
            })?;
        info!("✓ 规则配置已加载: {}", config.filter_config_path.display());

        let catalog = load_catalog(config.search_terms_path.as_deref()).await?;
        let terms = match config.batch {
            Some(batch) => orchestrator::slice(&catalog, batch, config.total_batches)?,
            None => catalog.clone(),
        };
        log_terms_loaded(terms.len(), catalog.len());

        let mut fetchers = api_fetchers(&config)?;

        let browser = if config.browser_enabled {
            let session = Arc::new(open_browser(&config).await?);
            fetchers.extend(browser_fetchers(session.clone(), &config));
            Some(session)
        } else {
            None
        };

        let sources: Vec<&str> = fetchers.iter().map(|f| f.source().as_str()).collect();
        info!("🌐 启用站点: {}", sources.join(", "));

        Ok(Self {
            config,
            rules,
            terms,
            fetchers,
            _browser: browser,
        })
    }

    /// 运行应用主逻辑：抓取 → 过滤 → 去重 → 导出
    pub async fn run(self) -> Result<()> {
        if self.terms.is_empty() {
            warn!("⚠️ 本批次没有搜索词，程序结束");
            return Ok(());
        }

        let ctx = RunContext::now(self.config.batch, self.config.total_batches);
        let orchestrator = ScrapeOrchestrator::new(self.fetchers, OrchestratorSettings::default());
        let mut report = orchestrator.run(&self.terms, &ctx).await;

        // ========== 过滤与去重 ==========
        let raw = report.postings.len();
        let outcome = apply_filter(std::mem::take(&mut report.postings), &self.rules);
        print_filter_stats(&outcome.stats);

        let leads = build_leads(&outcome.qualified, Local::now().date_naive());
        report.stats.total_jobs_raw = raw;
        report.stats.total_jobs_filtered = outcome.qualified.len();
        report.stats.unique_companies = leads.len();

        // ========== 导出 ==========
        let exporter = Exporter::new(&self.config.output_dir, &ctx.run_id, ctx.batch);
        let stats_path = exporter
            .write_run_stats(&report.stats, &outcome.stats)
            .context("写入运行统计失败")?;
        info!("📄 运行统计: {}", stats_path.display());

        if let Some(path) = exporter
            .write_search_errors(&report.errors)
            .context("写入搜索错误失败")?
        {
            info!("📄 搜索错误: {}", path.display());
        }

        let analytics_path = exporter
            .write_deep_analytics(&report.analytics)
            .context("写入深度诊断失败")?;
        info!("📄 深度诊断: {}", analytics_path.display());

        if !outcome.rejected.is_empty() {
            let path = exporter
                .write_rejected_leads(&outcome.rejected)
                .context("写入被拒职位失败")?;
            info!("📄 被拒职位样本: {}", path.display());
        }

        if leads.is_empty() {
            warn!("⚠️ 没有合格线索，跳过 CSV 导出");
        } else {
            let path = exporter.write_leads_csv(&leads).context("写入线索 CSV 失败")?;
            info!("📄 线索: {}", path.display());
        }

        print_final_stats(
            &report.stats,
            leads.len(),
            &self.config.output_dir.display().to_string(),
        );
        Ok(())
    }
}

// ========== 抓取器组装 ==========

fn api_fetchers(config: &RunConfig) -> Result<Vec<Box<dyn SiteFetcher>>> {
    let api: Arc<dyn SearchCapability> = Arc::new(
        HttpSearchApi::new(&config.search_api_url, SEARCH_API_TIMEOUT)
            .context("无法创建搜索服务客户端")?,
    );

    Ok([SourceName::Indeed, SourceName::Linkedin]
        .into_iter()
        .map(|source| {
            Box::new(
                ApiSiteFetcher::new(
                    source,
                    api.clone(),
                    &config.search_location,
                    config.results_wanted,
                )
                .with_proxies(config.proxies.clone()),
            ) as Box<dyn SiteFetcher>
        })
        .collect())
}

/// 浏览器站点走第一个代理；连接已有浏览器时代理由该浏览器自身决定
async fn open_browser(config: &RunConfig) -> Result<ChromiumSession> {
    let proxy = config.proxies.first().map(String::as_str);
    let session = match config.browser_debug_port {
        Some(port) => {
            if proxy.is_some() {
                warn!("⚠️ 连接已有浏览器时无法注入代理，浏览器站点不使用代理");
            }
            ChromiumSession::connect(port).await?
        }
        None => ChromiumSession::launch_headless(None, proxy).await?,
    };
    Ok(session)
}

fn browser_fetchers(session: Arc<ChromiumSession>, config: &RunConfig) -> Vec<Box<dyn SiteFetcher>> {
    let session: Arc<dyn BrowserSession> = session;
    let resolver = Arc::new(ChallengeResolver::default());
    let settings = BrowserFetchSettings {
        location: config.search_location.clone(),
        ..BrowserFetchSettings::default()
    };

    [SiteProfile::ziprecruiter(), SiteProfile::glassdoor()]
        .into_iter()
        .map(|profile| {
            Box::new(BrowserSiteFetcher::new(
                profile,
                session.clone(),
                resolver.clone(),
                settings.clone(),
            )) as Box<dyn SiteFetcher>
        })
        .collect()
}

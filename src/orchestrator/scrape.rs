//! 抓取编排器
//!
//! ## 职责
//!
//! 对本批次的每个搜索词，依次调用每个启用的站点抓取器：
//! - 每个站点最多尝试 2 次，失败后冷却再重试
//! - 失败按类别处理，blocked 立即打开该站点的断路器，不再重试
//! - 连续若干个搜索词没有任何结果时整体提前结束
//! - 站点之间、搜索词之间插入随机延迟
//!
//! ## 状态
//!
//! 断路器、连续失败计数、统计都放在 [`RunState`] 里，由编排器独占，
//! 在处理循环中显式传递。同一时间只处理一个搜索词。

use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::analytics::{DeepAnalytics, SearchAttempt};
use super::circuit::CircuitBreakers;
use super::classify::{classify_error, mentions_challenge, ErrorContext, ErrorKind};
use super::stats::{ScrapeStats, SearchError, StopReason};
use crate::error::FetchError;
use crate::models::{Posting, SearchTerm, SourceName};
use crate::sources::{FetchOutcome, SiteFetcher};
use crate::utils::logging::log_term_start;
use crate::utils::truncate_text;

/// 随机延迟区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub const fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// 在区间内均匀取一个值
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// 编排参数
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// 每个站点每个搜索词的最大尝试次数
    pub max_attempts: u32,
    /// 非封锁失败后的冷却时间
    pub retry_cooldown: Duration,
    /// 同一搜索词内站点之间的延迟
    pub source_delay: DelayRange,
    /// 搜索词之间的延迟
    pub term_delay: DelayRange,
    /// 连续无结果的搜索词数达到该值时提前结束
    pub max_consecutive_failures: u32,
    /// 单次抓取的超时
    pub fetch_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_cooldown: Duration::from_secs(15),
            source_delay: DelayRange::secs(2, 5),
            term_delay: DelayRange::secs(10, 20),
            max_consecutive_failures: 3,
            fetch_timeout: Duration::from_secs(180),
        }
    }
}

impl OrchestratorSettings {
    /// 所有等待为 0，其余与默认值相同
    pub fn immediate() -> Self {
        Self {
            retry_cooldown: Duration::ZERO,
            source_delay: DelayRange::zero(),
            term_delay: DelayRange::zero(),
            ..Self::default()
        }
    }
}

/// 运行标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    pub batch: Option<i64>,
    pub total_batches: i64,
}

impl RunContext {
    /// 以当前时间生成 run id（`YYYYmmdd_HHMMSS`）
    pub fn now(batch: Option<i64>, total_batches: i64) -> Self {
        Self {
            run_id: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            batch,
            total_batches,
        }
    }
}

/// 一次运行的产出
#[derive(Debug)]
pub struct ScrapeReport {
    pub postings: Vec<Posting>,
    pub stats: ScrapeStats,
    pub analytics: DeepAnalytics,
    pub errors: Vec<SearchError>,
    pub breakers: CircuitBreakers,
}

/// 编排器独占的运行状态
#[derive(Debug)]
pub struct RunState {
    pub breakers: CircuitBreakers,
    pub consecutive_failures: u32,
    pub stats: ScrapeStats,
    pub analytics: DeepAnalytics,
    pub errors: Vec<SearchError>,
    pub postings: Vec<Posting>,
}

impl RunState {
    pub fn new(ctx: &RunContext, terms_total: usize) -> Self {
        Self {
            breakers: CircuitBreakers::new(),
            consecutive_failures: 0,
            stats: ScrapeStats::new(ctx.run_id.clone(), ctx.batch, ctx.total_batches, terms_total),
            analytics: DeepAnalytics::new(ctx.run_id.clone(), ctx.batch),
            errors: Vec::new(),
            postings: Vec::new(),
        }
    }

    fn into_report(mut self) -> ScrapeReport {
        self.stats.finish();
        ScrapeReport {
            postings: self.postings,
            stats: self.stats,
            analytics: self.analytics,
            errors: self.errors,
            breakers: self.breakers,
        }
    }
}

/// 单个站点对单个搜索词的最终结果
#[derive(Debug)]
enum SourceResult {
    Success(Vec<Posting>),
    Blocked,
    Failed { error: FetchError, kind: ErrorKind },
}

/// 抓取编排器
pub struct ScrapeOrchestrator {
    fetchers: Vec<Box<dyn SiteFetcher>>,
    settings: OrchestratorSettings,
}

impl ScrapeOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - `fetchers`: 站点抓取器，顺序即尝试顺序
    /// - `settings`: 编排参数
    pub fn new(fetchers: Vec<Box<dyn SiteFetcher>>, settings: OrchestratorSettings) -> Self {
        Self { fetchers, settings }
    }

    pub fn sources(&self) -> Vec<SourceName> {
        self.fetchers.iter().map(|f| f.source()).collect()
    }

    /// 处理本批次的全部搜索词
    pub async fn run(&self, terms: &[SearchTerm], ctx: &RunContext) -> ScrapeReport {
        let mut state = RunState::new(ctx, terms.len());
        let total = terms.len();

        for (index, term) in terms.iter().enumerate() {
            log_term_start(index + 1, total, term.as_str());

            let active: Vec<&dyn SiteFetcher> = self
                .fetchers
                .iter()
                .map(|f| f.as_ref())
                .filter(|f| !state.breakers.is_open(f.source()))
                .collect();
            if active.is_empty() {
                warn!("🚫 所有站点均已被封锁，停止抓取");
                state.stats.stop_reason = Some(StopReason::AllSourcesBlocked);
                break;
            }

            let found = self.process_term(term, &active, &mut state).await;
            state.stats.search_terms_completed += 1;

            if found > 0 {
                info!("  '{}' 共 {} 个职位", term, found);
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures += 1;
                warn!(
                    "  '{}' 没有任何站点返回结果 (连续 {} 次)",
                    term, state.consecutive_failures
                );
            }

            if state.consecutive_failures >= self.settings.max_consecutive_failures {
                let reason = StopReason::ConsecutiveFailures {
                    count: state.consecutive_failures,
                    after_terms: (index + 1).saturating_sub(state.consecutive_failures as usize),
                };
                warn!("⏹️ {}", reason);
                state.stats.stop_reason = Some(reason);
                break;
            }

            if index + 1 < total {
                let delay = self.settings.term_delay.sample();
                debug!("  等待 {:.1}s 后继续下一个搜索词", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
        }

        state.into_report()
    }

    /// 对一个搜索词依次尝试各站点，返回找到的职位数
    pub async fn process_term(
        &self,
        term: &SearchTerm,
        active: &[&dyn SiteFetcher],
        state: &mut RunState,
    ) -> usize {
        let mut found = 0;

        for (index, fetcher) in active.iter().enumerate() {
            let source = fetcher.source();
            state.stats.record_site_attempt(source);

            match self.fetch_with_retry(*fetcher, term, state).await {
                SourceResult::Success(postings) => {
                    found += postings.len();
                    state.postings.extend(postings);
                }
                SourceResult::Blocked => {}
                SourceResult::Failed { error, kind } => {
                    state.stats.record_site_error(source);
                    state.errors.push(SearchError::new(
                        term,
                        source,
                        kind,
                        &error,
                        self.settings.max_attempts,
                    ));
                }
            }

            if index + 1 < active.len() {
                tokio::time::sleep(self.settings.source_delay.sample()).await;
            }
        }

        found
    }

    /// 单个站点的重试循环
    async fn fetch_with_retry(
        &self,
        fetcher: &dyn SiteFetcher,
        term: &SearchTerm,
        state: &mut RunState,
    ) -> SourceResult {
        let source = fetcher.source();
        let mut last_failure = None;

        for attempt in 0..self.settings.max_attempts {
            let started = Instant::now();
            let mut record = SearchAttempt::new(term, source, attempt);

            let result = match tokio::time::timeout(self.settings.fetch_timeout, fetcher.fetch(term)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(format!(
                    "超过 {}s 未完成",
                    self.settings.fetch_timeout.as_secs()
                ))),
            };
            record.duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(outcome) => {
                    let count = outcome.postings.len();
                    apply_diagnostics(&mut record, &outcome);
                    record.success = true;
                    record.jobs_found = count;
                    state.analytics.record_attempt(record);
                    state.stats.record_site_success(source, count);

                    if count > 0 {
                        info!("  [{}] 找到 {} 个职位", source, count);
                    } else {
                        info!("  [{}] 无结果", source);
                    }
                    return SourceResult::Success(outcome.postings);
                }
                Err(error) => {
                    let kind = classify_error(&error);
                    let context = ErrorContext::from_error(&error);

                    record.error_type = Some(kind);
                    record.http_status = context.status_code;
                    record.error_message = Some(context.message.clone());
                    if mentions_challenge(&error) {
                        record.challenge_detected = true;
                        record.challenge_solved = Some(false);
                    }
                    state.analytics.record_attempt(record);

                    warn!(
                        "  [{}] 第 {} 次尝试失败 ({}): {}",
                        source,
                        attempt + 1,
                        kind,
                        truncate_text(&context.message, 100)
                    );

                    if kind == ErrorKind::Blocked {
                        warn!("  [{}] 站点疑似封锁，本次运行不再尝试", source);
                        state.breakers.trip(source, term, &context.message);
                        state.stats.record_site_blocked(source, term, &context.message);
                        return SourceResult::Blocked;
                    }

                    last_failure = Some((error, kind));
                    if attempt + 1 < self.settings.max_attempts {
                        tokio::time::sleep(self.settings.retry_cooldown).await;
                    }
                }
            }
        }

        let (error, kind) = last_failure
            .unwrap_or_else(|| (FetchError::Other("未进行任何尝试".to_string()), ErrorKind::Unknown));
        SourceResult::Failed { error, kind }
    }
}

fn apply_diagnostics(record: &mut SearchAttempt, outcome: &FetchOutcome) {
    let diag = &outcome.diagnostics;
    record.challenge_detected = diag.challenge_detected;
    record.challenge_solved = diag.challenge_solved;
    record.selector_matched = diag.selector_matched.clone();
    record.selectors_tried = diag.selectors_tried.clone();
    record.page_title = diag.page_title.clone();
    record.http_status = diag.http_status;
}

//! 运行统计：按来源计数、封锁事件、搜索错误记录

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::fmt;

use super::classify::{ErrorContext, ErrorKind, MAX_STORED_MESSAGE};
use crate::error::FetchError;
use crate::models::{SearchTerm, SourceName};
use crate::utils::{clip, mask_credentials};

/// 单个来源的计数
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteStats {
    pub searches_attempted: u32,
    pub searches_successful: u32,
    #[serde(rename = "total_jobs_found")]
    pub jobs_found: u32,
    pub blocked: bool,
    pub blocked_at_term: Option<SearchTerm>,
    #[serde(rename = "error_count")]
    pub errors: u32,
    pub success_rate: f64,
}

impl SiteStats {
    fn refresh_rate(&mut self) {
        self.success_rate = percent(self.searches_successful as usize, self.searches_attempted as usize);
    }
}

/// 来源被封锁的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedEvent {
    pub site: SourceName,
    pub search_term: SearchTerm,
    pub error_message: String,
    pub timestamp: DateTime<Local>,
}

/// 提前结束的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// 连续若干个搜索词没有任何来源返回职位
    ConsecutiveFailures { count: u32, after_terms: usize },
    /// 所有启用的来源都已被封锁
    AllSourcesBlocked,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ConsecutiveFailures { count, after_terms } => write!(
                f,
                "连续 {count} 个搜索词无结果，疑似被限流 (已完成 {after_terms} 个)"
            ),
            StopReason::AllSourcesBlocked => write!(f, "所有来源均已被封锁"),
        }
    }
}

/// 一条搜索失败记录（两次尝试都失败且未被封锁）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchError {
    pub search_term: SearchTerm,
    pub site: SourceName,
    pub error_type: ErrorKind,
    pub error_message: String,
    pub attempts: u32,
    pub timestamp: DateTime<Local>,
    pub exception_class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl SearchError {
    pub fn new(term: &SearchTerm, site: SourceName, kind: ErrorKind, error: &FetchError, attempts: u32) -> Self {
        let context = ErrorContext::from_error(error);
        Self {
            search_term: term.clone(),
            site,
            error_type: kind,
            error_message: context.message,
            attempts,
            timestamp: Local::now(),
            exception_class: context.class_name,
            status_code: context.status_code,
        }
    }
}

/// 整次运行的统计
#[derive(Debug, Clone)]
pub struct ScrapeStats {
    pub run_id: String,
    pub batch: Option<i64>,
    pub total_batches: i64,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub search_terms_total: usize,
    pub search_terms_completed: usize,
    /// 按首次出现顺序排列
    sites: Vec<(SourceName, SiteStats)>,
    pub blocked_sites: Vec<BlockedEvent>,
    pub total_jobs_raw: usize,
    pub total_jobs_filtered: usize,
    pub unique_companies: usize,
    pub stop_reason: Option<StopReason>,
}

impl ScrapeStats {
    pub fn new(run_id: impl Into<String>, batch: Option<i64>, total_batches: i64, terms_total: usize) -> Self {
        Self {
            run_id: run_id.into(),
            batch,
            total_batches,
            start_time: Local::now(),
            end_time: None,
            search_terms_total: terms_total,
            search_terms_completed: 0,
            sites: Vec::new(),
            blocked_sites: Vec::new(),
            total_jobs_raw: 0,
            total_jobs_filtered: 0,
            unique_companies: 0,
            stop_reason: None,
        }
    }

    fn site_mut(&mut self, source: SourceName) -> &mut SiteStats {
        let index = match self.sites.iter().position(|(s, _)| *s == source) {
            Some(index) => index,
            None => {
                self.sites.push((source, SiteStats::default()));
                self.sites.len() - 1
            }
        };
        &mut self.sites[index].1
    }

    pub fn site(&self, source: SourceName) -> Option<&SiteStats> {
        self.sites.iter().find(|(s, _)| *s == source).map(|(_, stats)| stats)
    }

    /// 按插入顺序遍历各来源统计
    pub fn site_stats(&self) -> impl Iterator<Item = (SourceName, &SiteStats)> {
        self.sites.iter().map(|(s, stats)| (*s, stats))
    }

    pub fn record_site_attempt(&mut self, source: SourceName) {
        let site = self.site_mut(source);
        site.searches_attempted += 1;
        site.refresh_rate();
    }

    pub fn record_site_success(&mut self, source: SourceName, jobs_found: usize) {
        let site = self.site_mut(source);
        site.searches_successful += 1;
        site.jobs_found += jobs_found as u32;
        site.refresh_rate();
    }

    pub fn record_site_blocked(&mut self, source: SourceName, term: &SearchTerm, message: &str) {
        let site = self.site_mut(source);
        site.blocked = true;
        site.blocked_at_term = Some(term.clone());
        self.blocked_sites.push(BlockedEvent {
            site: source,
            search_term: term.clone(),
            error_message: mask_credentials(&clip(message, MAX_STORED_MESSAGE)),
            timestamp: Local::now(),
        });
    }

    pub fn record_site_error(&mut self, source: SourceName) {
        self.site_mut(source).errors += 1;
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Local::now());
    }

    pub fn completion_rate(&self) -> f64 {
        percent(self.search_terms_completed, self.search_terms_total)
    }

    /// 被过滤掉的比例（百分比）
    pub fn filter_rate(&self) -> f64 {
        if self.total_jobs_raw == 0 {
            return 0.0;
        }
        round1((1.0 - self.total_jobs_filtered as f64 / self.total_jobs_raw as f64) * 100.0)
    }
}

// ========== 序列化 ==========

#[derive(Serialize)]
struct StatsMetadata<'a> {
    run_id: &'a str,
    batch: Option<i64>,
    total_batches: i64,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<&'a StopReason>,
}

#[derive(Serialize)]
struct TermProgress {
    total: usize,
    completed: usize,
    completion_rate: f64,
}

#[derive(Serialize)]
struct ResultCounts {
    total_jobs_raw: usize,
    total_jobs_filtered: usize,
    unique_companies: usize,
    filter_rate: f64,
}

#[derive(Serialize)]
struct StatsDocument<'a> {
    metadata: StatsMetadata<'a>,
    search_terms: TermProgress,
    #[serde(serialize_with = "ordered_sites")]
    sites: &'a [(SourceName, SiteStats)],
    blocked_sites: &'a [BlockedEvent],
    results: ResultCounts,
}

fn ordered_sites<S: Serializer>(sites: &&[(SourceName, SiteStats)], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(sites.iter().map(|(source, stats)| (source.as_str(), stats)))
}

impl Serialize for ScrapeStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StatsDocument {
            metadata: StatsMetadata {
                run_id: &self.run_id,
                batch: self.batch,
                total_batches: self.total_batches,
                start_time: self.start_time,
                end_time: self.end_time,
                stop_reason: self.stop_reason.as_ref(),
            },
            search_terms: TermProgress {
                total: self.search_terms_total,
                completed: self.search_terms_completed,
                completion_rate: self.completion_rate(),
            },
            sites: &self.sites,
            blocked_sites: &self.blocked_sites,
            results: ResultCounts {
                total_jobs_raw: self.total_jobs_raw,
                total_jobs_filtered: self.total_jobs_filtered,
                unique_companies: self.unique_companies,
                filter_rate: self.filter_rate(),
            },
        }
        .serialize(serializer)
    }
}

/// 百分比，保留一位小数；分母为 0 时为 0
pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

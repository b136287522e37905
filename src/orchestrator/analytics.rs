//! 深度诊断：逐次尝试日志与派生汇总
//!
//! [`SearchAttempt`] 只追加、不修改；所有汇总都在导出时从日志重新计算。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::classify::ErrorKind;
use super::stats::{percent, round1};
use crate::models::{SearchTerm, SourceName};
use crate::utils::clip;

/// 错误消息在汇总里的截断长度
const TOP_MESSAGE_CHARS: usize = 100;
const TOP_MESSAGE_LIMIT: usize = 10;

/// 单次抓取尝试
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchAttempt {
    pub search_term: SearchTerm,
    pub site: SourceName,
    pub timestamp: DateTime<Local>,
    pub success: bool,
    pub jobs_found: usize,
    pub duration_ms: u64,
    pub http_status: Option<u16>,
    pub error_type: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// 第几次尝试（从 0 开始）
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selectors_tried: Vec<String>,
    pub selector_matched: Option<String>,
    pub challenge_detected: bool,
    pub challenge_solved: Option<bool>,
    pub page_title: Option<String>,
}

impl SearchAttempt {
    pub fn new(term: &SearchTerm, site: SourceName, retry_count: u32) -> Self {
        Self {
            search_term: term.clone(),
            site,
            timestamp: Local::now(),
            success: false,
            jobs_found: 0,
            duration_ms: 0,
            http_status: None,
            error_type: None,
            error_message: None,
            retry_count,
            selectors_tried: Vec::new(),
            selector_matched: None,
            challenge_detected: false,
            challenge_solved: None,
            page_title: None,
        }
    }
}

/// 按来源汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteSummary {
    pub total_attempts: usize,
    pub successful_attempts: usize,
    pub total_jobs: usize,
    pub total_duration_ms: u64,
    pub errors_by_type: BTreeMap<ErrorKind, usize>,
    pub challenge_encounters: usize,
    pub challenge_solved: usize,
    pub challenge_failed: usize,
    pub http_status_codes: BTreeMap<u16, usize>,
    pub selectors_used: BTreeMap<String, usize>,
    pub avg_jobs_per_success: f64,
    pub avg_duration_ms: u64,
    pub success_rate: f64,
}

/// 按搜索词汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TermPerformance {
    pub total_attempts: usize,
    pub successful_attempts: usize,
    pub total_jobs: usize,
    pub sites_tried: BTreeSet<SourceName>,
    pub sites_successful: BTreeSet<SourceName>,
    pub sites_failed: BTreeSet<SourceName>,
    pub success_rate: f64,
}

/// 成功请求的耗时分布
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingDistribution {
    pub count: usize,
    #[serde(flatten)]
    pub spread: Option<TimingSpread>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingSpread {
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteErrors {
    pub count: usize,
    pub types: BTreeMap<ErrorKind, usize>,
}

/// 错误模式分析
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorAnalysis {
    pub total_errors: usize,
    pub by_type: BTreeMap<ErrorKind, usize>,
    pub by_site: BTreeMap<SourceName, SiteErrors>,
    /// 出现次数最多的消息（截断到 100 字符），按次数降序
    pub top_error_messages: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChallengeBySite {
    pub encounters: usize,
    pub solved: usize,
}

/// 验证挑战处理情况
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChallengeAnalysis {
    pub total_encounters: usize,
    pub solved: usize,
    pub failed: usize,
    pub solve_rate: f64,
    pub by_site: BTreeMap<SourceName, ChallengeBySite>,
}

#[derive(Debug, Clone, Serialize)]
struct AnalyticsMetadata<'a> {
    run_id: &'a str,
    batch: Option<i64>,
    generated_at: DateTime<Local>,
    total_search_attempts: usize,
}

/// 深度诊断导出文档
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsDocument<'a> {
    metadata: AnalyticsMetadata<'a>,
    site_summaries: BTreeMap<SourceName, SiteSummary>,
    search_term_performance: BTreeMap<SearchTerm, TermPerformance>,
    timing_distribution: TimingDistribution,
    error_analysis: ErrorAnalysis,
    challenge_analysis: ChallengeAnalysis,
    raw_attempts: &'a [SearchAttempt],
}

/// 深度诊断收集器
#[derive(Debug, Clone)]
pub struct DeepAnalytics {
    pub run_id: String,
    pub batch: Option<i64>,
    attempts: Vec<SearchAttempt>,
}

impl DeepAnalytics {
    pub fn new(run_id: impl Into<String>, batch: Option<i64>) -> Self {
        Self {
            run_id: run_id.into(),
            batch,
            attempts: Vec::new(),
        }
    }

    pub fn record_attempt(&mut self, attempt: SearchAttempt) {
        self.attempts.push(attempt);
    }

    pub fn attempts(&self) -> &[SearchAttempt] {
        &self.attempts
    }

    pub fn site_summaries(&self) -> BTreeMap<SourceName, SiteSummary> {
        let mut sites: BTreeMap<SourceName, SiteSummary> = BTreeMap::new();
        for attempt in &self.attempts {
            let s = sites.entry(attempt.site).or_default();
            s.total_attempts += 1;
            s.total_duration_ms += attempt.duration_ms;
            if attempt.success {
                s.successful_attempts += 1;
                s.total_jobs += attempt.jobs_found;
            }
            if let Some(kind) = attempt.error_type {
                *s.errors_by_type.entry(kind).or_insert(0) += 1;
            }
            if attempt.challenge_detected {
                s.challenge_encounters += 1;
                match attempt.challenge_solved {
                    Some(true) => s.challenge_solved += 1,
                    Some(false) => s.challenge_failed += 1,
                    None => {}
                }
            }
            if let Some(status) = attempt.http_status {
                *s.http_status_codes.entry(status).or_insert(0) += 1;
            }
            if let Some(selector) = &attempt.selector_matched {
                *s.selectors_used.entry(selector.clone()).or_insert(0) += 1;
            }
        }

        for s in sites.values_mut() {
            s.success_rate = percent(s.successful_attempts, s.total_attempts);
            if s.total_attempts > 0 {
                s.avg_duration_ms = (s.total_duration_ms as f64 / s.total_attempts as f64).round() as u64;
            }
            if s.successful_attempts > 0 {
                s.avg_jobs_per_success = round1(s.total_jobs as f64 / s.successful_attempts as f64);
            }
        }
        sites
    }

    pub fn term_performance(&self) -> BTreeMap<SearchTerm, TermPerformance> {
        let mut terms: BTreeMap<SearchTerm, TermPerformance> = BTreeMap::new();
        for attempt in &self.attempts {
            let t = terms.entry(attempt.search_term.clone()).or_default();
            t.total_attempts += 1;
            t.sites_tried.insert(attempt.site);
            if attempt.success {
                t.successful_attempts += 1;
                t.total_jobs += attempt.jobs_found;
                t.sites_successful.insert(attempt.site);
            } else {
                t.sites_failed.insert(attempt.site);
            }
        }
        for t in terms.values_mut() {
            t.success_rate = percent(t.successful_attempts, t.total_attempts);
        }
        terms
    }

    pub fn timing_distribution(&self) -> TimingDistribution {
        let mut durations: Vec<u64> = self
            .attempts
            .iter()
            .filter(|a| a.success && a.duration_ms > 0)
            .map(|a| a.duration_ms)
            .collect();
        if durations.is_empty() {
            return TimingDistribution {
                count: 0,
                spread: None,
            };
        }
        durations.sort_unstable();

        let n = durations.len();
        let last = durations[n - 1];
        let total: u64 = durations.iter().sum();
        // 样本不足时高分位取最大值
        let p90 = if n >= 10 { durations[n * 9 / 10] } else { last };
        let p99 = if n >= 100 { durations[n * 99 / 100] } else { last };

        TimingDistribution {
            count: n,
            spread: Some(TimingSpread {
                min_ms: durations[0],
                max_ms: last,
                avg_ms: (total as f64 / n as f64).round() as u64,
                p50_ms: durations[n / 2],
                p90_ms: p90,
                p99_ms: p99,
            }),
        }
    }

    pub fn error_analysis(&self) -> ErrorAnalysis {
        let mut analysis = ErrorAnalysis::default();
        let mut messages: BTreeMap<String, usize> = BTreeMap::new();

        for attempt in self.attempts.iter().filter(|a| !a.success) {
            analysis.total_errors += 1;
            let kind = attempt.error_type.unwrap_or(ErrorKind::Unknown);
            *analysis.by_type.entry(kind).or_insert(0) += 1;

            let site = analysis.by_site.entry(attempt.site).or_default();
            site.count += 1;
            *site.types.entry(kind).or_insert(0) += 1;

            if let Some(message) = attempt.error_message.as_deref().filter(|m| !m.is_empty()) {
                *messages.entry(clip(message, TOP_MESSAGE_CHARS)).or_insert(0) += 1;
            }
        }

        let mut top: Vec<(String, usize)> = messages.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(TOP_MESSAGE_LIMIT);
        analysis.top_error_messages = top;
        analysis
    }

    pub fn challenge_analysis(&self) -> ChallengeAnalysis {
        let mut analysis = ChallengeAnalysis::default();
        for attempt in self.attempts.iter().filter(|a| a.challenge_detected) {
            analysis.total_encounters += 1;
            let site = analysis.by_site.entry(attempt.site).or_default();
            site.encounters += 1;
            match attempt.challenge_solved {
                Some(true) => {
                    analysis.solved += 1;
                    site.solved += 1;
                }
                Some(false) => analysis.failed += 1,
                None => {}
            }
        }
        analysis.solve_rate = percent(analysis.solved, analysis.total_encounters);
        analysis
    }

    /// 生成导出文档
    pub fn document(&self) -> AnalyticsDocument<'_> {
        AnalyticsDocument {
            metadata: AnalyticsMetadata {
                run_id: &self.run_id,
                batch: self.batch,
                generated_at: Local::now(),
                total_search_attempts: self.attempts.len(),
            },
            site_summaries: self.site_summaries(),
            search_term_performance: self.term_performance(),
            timing_distribution: self.timing_distribution(),
            error_analysis: self.error_analysis(),
            challenge_analysis: self.challenge_analysis(),
            raw_attempts: &self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(site: SourceName, term: &str, success: bool, duration_ms: u64) -> SearchAttempt {
        SearchAttempt {
            success,
            duration_ms,
            jobs_found: if success { 5 } else { 0 },
            ..SearchAttempt::new(&SearchTerm::from(term), site, 0)
        }
    }

    #[test]
    fn site_summary_counts_and_averages() {
        let mut analytics = DeepAnalytics::new("run", None);
        analytics.record_attempt(attempt(SourceName::Indeed, "a", true, 100));
        analytics.record_attempt(attempt(SourceName::Indeed, "b", true, 300));
        let mut failed = attempt(SourceName::Indeed, "c", false, 200);
        failed.error_type = Some(ErrorKind::Timeout);
        failed.http_status = Some(504);
        analytics.record_attempt(failed);

        let summary = &analytics.site_summaries()[&SourceName::Indeed];
        assert_eq!(summary.total_attempts, 3);
        assert_eq!(summary.successful_attempts, 2);
        assert_eq!(summary.total_jobs, 10);
        assert_eq!(summary.avg_duration_ms, 200);
        assert_eq!(summary.avg_jobs_per_success, 5.0);
        assert_eq!(summary.success_rate, 66.7);
        assert_eq!(summary.errors_by_type[&ErrorKind::Timeout], 1);
        assert_eq!(summary.http_status_codes[&504], 1);
    }

    #[test]
    fn timing_uses_max_for_small_samples() {
        let mut analytics = DeepAnalytics::new("run", None);
        for ms in [50, 10, 30, 0] {
            analytics.record_attempt(attempt(SourceName::Linkedin, "t", true, ms));
        }
        let timing = analytics.timing_distribution();
        assert_eq!(timing.count, 3);
        let spread = timing.spread.unwrap();
        assert_eq!((spread.min_ms, spread.max_ms), (10, 50));
        assert_eq!(spread.p50_ms, 30);
        assert_eq!(spread.p90_ms, 50);
        assert_eq!(spread.p99_ms, 50);
        assert_eq!(spread.avg_ms, 30);
    }

    #[test]
    fn term_performance_tracks_sites() {
        let mut analytics = DeepAnalytics::new("run", None);
        analytics.record_attempt(attempt(SourceName::Indeed, "pv designer", true, 10));
        analytics.record_attempt(attempt(SourceName::Linkedin, "pv designer", false, 10));
        let perf = &analytics.term_performance()[&SearchTerm::from("pv designer")];
        assert_eq!(perf.sites_tried.len(), 2);
        assert!(perf.sites_successful.contains(&SourceName::Indeed));
        assert!(perf.sites_failed.contains(&SourceName::Linkedin));
        assert_eq!(perf.success_rate, 50.0);
    }

    #[test]
    fn error_and_challenge_analysis() {
        let mut analytics = DeepAnalytics::new("run", Some(0));
        for solved in [Some(true), Some(false), Some(false)] {
            let mut a = attempt(SourceName::ZipRecruiter, "t", solved == Some(true), 10);
            a.challenge_detected = true;
            a.challenge_solved = solved;
            if solved == Some(false) {
                a.error_type = Some(ErrorKind::Blocked);
                a.error_message = Some("验证挑战未解决".to_string());
            }
            analytics.record_attempt(a);
        }

        let errors = analytics.error_analysis();
        assert_eq!(errors.total_errors, 2);
        assert_eq!(errors.by_type[&ErrorKind::Blocked], 2);
        assert_eq!(errors.top_error_messages, vec![("验证挑战未解决".to_string(), 2)]);

        let challenge = analytics.challenge_analysis();
        assert_eq!(challenge.total_encounters, 3);
        assert_eq!(challenge.solved, 1);
        assert_eq!(challenge.failed, 2);
        assert_eq!(challenge.solve_rate, 33.3);
        assert_eq!(challenge.by_site[&SourceName::ZipRecruiter].solved, 1);
    }
}

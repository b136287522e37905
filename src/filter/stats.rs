//! 过滤统计与被拒样本

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::config::RuleConfig;
use super::scoring::{score_posting, ScoringResult};
use crate::models::Posting;

/// 合格职位没有命中任何层时的层标签
pub const NO_TIER: &str = "none";

/// 过滤统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterStats {
    pub total_processed: usize,
    pub total_qualified: usize,
    pub total_rejected: usize,
    pub company_blocked: usize,
    pub rejection_categories: BTreeMap<String, usize>,
    pub qualification_tiers: BTreeMap<String, usize>,
}

impl FilterStats {
    /// 按评分结果记录一条
    pub fn record(&mut self, result: &ScoringResult) {
        self.total_processed += 1;
        match result.verdict.rejection_category() {
            None => {
                self.total_qualified += 1;
                let tier = result
                    .highest_tier()
                    .map(|t| t.as_str())
                    .unwrap_or(NO_TIER);
                *self.qualification_tiers.entry(tier.to_string()).or_insert(0) += 1;
            }
            Some(category) => {
                self.total_rejected += 1;
                if result.company_score < 0.0 {
                    self.company_blocked += 1;
                }
                *self.rejection_categories.entry(category).or_insert(0) += 1;
            }
        }
    }

    /// 通过率（百分比）
    pub fn pass_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.total_qualified as f64 / self.total_processed as f64 * 100.0
    }

    /// 出现次数最多的拒绝类别，次数相同时按名称排序
    pub fn top_rejections(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .rejection_categories
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        entries.truncate(limit);
        entries
    }
}

/// 被拒职位样本，供人工复核标注
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedSample {
    pub id: String,
    pub description: String,
    pub company: String,
    pub title: String,
    pub rejection_reason: String,
    pub score: f64,
}

/// 一次过滤的结果
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// 合格的职位及其评分，保持输入顺序
    pub qualified: Vec<(Posting, ScoringResult)>,
    pub stats: FilterStats,
    pub rejected: Vec<RejectedSample>,
}

/// 对全部职位评分并分流
pub fn apply_filter(postings: Vec<Posting>, config: &RuleConfig) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for posting in postings {
        let result = score_posting(&posting, config);
        outcome.stats.record(&result);

        match result.verdict.rejection_category() {
            None => outcome.qualified.push((posting, result)),
            Some(category) => {
                debug!(
                    "❌ 拒绝 {} @ {}: {}",
                    posting.title,
                    posting.company,
                    result.reasons.first().map(String::as_str).unwrap_or("")
                );
                let n = outcome.rejected.len() + 1;
                let prefix: String = posting.company.chars().take(20).collect();
                outcome.rejected.push(RejectedSample {
                    id: format!("rejected_{n:03}_{prefix}"),
                    description: posting.description,
                    company: posting.company,
                    title: posting.title,
                    rejection_reason: category,
                    score: result.score,
                });
            }
        }
    }

    info!(
        "🔎 过滤完成: 处理 {} 条, 合格 {} 条 ({:.1}%)",
        outcome.stats.total_processed,
        outcome.stats.total_qualified,
        outcome.stats.pass_rate()
    );
    outcome
}

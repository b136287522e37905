//! 职位资格过滤：规则配置、评分引擎、过滤统计

pub mod config;
pub mod scoring;
pub mod stats;

pub use config::{CheckArea, RuleConfig, DEFAULT_THRESHOLD};
pub use scoring::{qualifies, score_job, score_posting, ScoringResult, Tier, Verdict};
pub use stats::{apply_filter, FilterOutcome, FilterStats, RejectedSample};

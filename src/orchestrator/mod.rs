//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责搜索词的分批和抓取流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch` - 批次分配器
//! - 把搜索词列表切成互不重叠、保持顺序的批次
//!
//! ### `scrape` - 抓取编排器
//! - 遍历搜索词和站点，重试、冷却、随机延迟
//! - 持有断路器和连续失败计数（`RunState`）
//!
//! ### `circuit` / `classify` - 断路器与失败分类
//!
//! ### `stats` / `analytics` - 运行统计与深度诊断
//!
//! ## 层次关系
//!
//! ```text
//! batch (切分 Vec<SearchTerm>)
//!     ↓
//! scrape (逐个搜索词 × 逐个站点)
//!     ↓
//! sources::SiteFetcher (单次搜索)
//!     ↓
//! challenge::ChallengeResolver (仅浏览器站点)
//! ```

pub mod analytics;
pub mod batch;
pub mod circuit;
pub mod classify;
pub mod scrape;
pub mod stats;

// 重新导出主要类型
pub use analytics::{DeepAnalytics, SearchAttempt};
pub use batch::slice;
pub use circuit::CircuitBreakers;
pub use classify::{classify_error, extract_status_code, ErrorKind};
pub use scrape::{
    DelayRange, OrchestratorSettings, RunContext, RunState, ScrapeOrchestrator, ScrapeReport,
};
pub use stats::{BlockedEvent, ScrapeStats, SearchError, SiteStats, StopReason};

//! # Solar Leads
//!
//! 从招聘站点抓取光伏设计相关职位，按规则评分过滤，整理成按公司去重的销售线索
//!
//! ## 架构设计
//!
//! ### ① 浏览器层（Browser）
//! - `browser/` - 持有浏览器会话，只暴露页面能力（`PageDriver`）
//! - `challenge/` - 验证挑战状态机和定位策略
//!
//! ### ② 来源层（Sources）
//! - `sources/` - 每个站点一个抓取器，对一个搜索词执行一次搜索
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/` - 分批、重试、失败分类、断路器和运行统计
//!
//! ### ④ 结果层（Results）
//! - `filter/` - 规则配置和评分引擎
//! - `processing` - 按公司去重生成线索
//! - `export` - 导出 JSON/CSV
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod challenge;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod models;
pub mod orchestrator;
pub mod processing;
pub mod sources;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use config::RunConfig;
pub use error::{AppError, AppResult, FetchError};
pub use filter::{score_job, RuleConfig, ScoringResult};
pub use models::{Posting, SearchTerm, SourceName};
pub use orchestrator::{ScrapeOrchestrator, ScrapeReport};
pub use processing::{build_leads, Lead};

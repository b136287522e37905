//! 运行配置
//!
//! 全部来自环境变量（可选从 `.env` 读取）。数值类变量格式错误时直接报错，
//! 不静默回退到默认值。

use std::path::PathBuf;

use crate::error::{AppResult, BatchError, ConfigError};
use crate::orchestrator::batch::batch_bounds;

/// 程序配置
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// 批次下标，None 表示处理全部搜索词
    pub batch: Option<i64>,
    /// 批次总数
    pub total_batches: i64,
    /// 是否启用浏览器来源（ZipRecruiter、Glassdoor）
    pub browser_enabled: bool,
    /// 代理列表，原样透传给搜索服务
    pub proxies: Vec<String>,
    /// 规则配置文件
    pub filter_config_path: PathBuf,
    /// 搜索词目录覆盖文件（TOML）
    pub search_terms_path: Option<PathBuf>,
    /// 搜索服务地址
    pub search_api_url: String,
    pub search_location: String,
    /// 每次搜索的结果上限
    pub results_wanted: u32,
    /// 连接已有浏览器的调试端口，未设置时启动无头浏览器
    pub browser_debug_port: Option<u16>,
    /// 导出目录
    pub output_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch: None,
            total_batches: 4,
            browser_enabled: false,
            proxies: Vec::new(),
            filter_config_path: PathBuf::from("config/filter-config.json"),
            search_terms_path: None,
            search_api_url: "http://127.0.0.1:8000".to_string(),
            search_location: "USA".to_string(),
            results_wanted: 1000,
            browser_debug_port: None,
            output_dir: PathBuf::from("output"),
            verbose_logging: false,
        }
    }
}

impl RunConfig {
    /// 从环境变量加载（先读取 `.env`，已存在的环境变量优先）
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载
    ///
    /// # 参数
    /// - `lookup`: 按变量名取值，空字符串视为未设置
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let default = Self::default();

        let config = Self {
            batch: parse_opt(&get, "SCRAPER_BATCH")?,
            total_batches: parse_opt(&get, "SCRAPER_TOTAL_BATCHES")?.unwrap_or(default.total_batches),
            browser_enabled: get("ENABLE_BROWSER_SCRAPING")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(default.browser_enabled),
            proxies: get("SCRAPER_PROXIES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            filter_config_path: get("FILTER_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.filter_config_path),
            search_terms_path: get("SEARCH_TERMS_PATH").map(PathBuf::from),
            search_api_url: get("SEARCH_API_URL").unwrap_or(default.search_api_url),
            search_location: get("SEARCH_LOCATION").unwrap_or(default.search_location),
            results_wanted: parse_opt(&get, "RESULTS_WANTED")?.unwrap_or(default.results_wanted),
            browser_debug_port: parse_opt(&get, "BROWSER_DEBUG_PORT")?,
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or(default.output_dir),
            verbose_logging: parse_opt(&get, "VERBOSE_LOGGING")?.unwrap_or(default.verbose_logging),
        };

        config.validate_batch()?;
        Ok(config)
    }

    /// 校验批次参数，抓取开始前失败
    pub fn validate_batch(&self) -> Result<(), BatchError> {
        match self.batch {
            Some(batch) => batch_bounds(0, batch, self.total_batches).map(|_| ()),
            None => Ok(()),
        }
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(key, raw, std::any::type_name::<T>())),
    }
}

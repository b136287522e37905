use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（规则配置缺键、环境变量非法），在抓取开始前中止运行
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 批次参数错误
    #[error("批次错误: {0}")]
    Batch(#[from] BatchError),
    /// 浏览器启动/连接错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 导出错误
    #[error("导出错误: {0}")]
    Export(#[from] ExportError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 规则配置缺少必需的键（config_invalid）
    #[error("规则配置缺少必需的键: {key}")]
    MissingKey { key: String },
    /// 规则配置结构不合法
    #[error("规则配置结构不合法 ({path}): {message}")]
    InvalidShape { path: String, message: String },
    /// 读取规则配置失败
    #[error("读取规则配置失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 规则配置不是合法 JSON
    #[error("规则配置 JSON 解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 批次切分参数错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("total_batches 必须 >= 1, 实际为 {0}")]
    NoBatches(i64),
    #[error("batch 必须 >= 0, 实际为 {0}")]
    NegativeIndex(i64),
    #[error("batch ({index}) 必须 < total_batches ({total})")]
    IndexOutOfRange { index: i64, total: i64 },
}

/// 浏览器启动错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {message}")]
    ConnectionFailed { port: u16, message: String },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {0}")]
    ConfigurationFailed(String),
    /// 启动浏览器失败
    #[error("启动浏览器失败: {0}")]
    LaunchFailed(String),
}

/// 单次抓取失败
///
/// 消息里保留来源返回的原始文本，分类器依赖其中的状态码与关键词。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("请求超时 (timeout): {0}")]
    Timeout(String),
    #[error("连接失败 (connection): {0}")]
    Connection(String),
    /// 验证挑战在限定轮数内未解决，按 blocked 处理
    #[error("验证挑战未解决 (challenge unsolved after {rounds} rounds)")]
    ChallengeUnsolved { rounds: u32 },
    #[error("浏览器操作失败: {0}")]
    Browser(String),
    #[error("解析失败: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// 错误自带的 HTTP 状态码
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 变体名，写入错误记录
    pub fn class_name(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "Http",
            FetchError::Timeout(_) => "Timeout",
            FetchError::Connection(_) => "Connection",
            FetchError::ChallengeUnsolved { .. } => "ChallengeUnsolved",
            FetchError::Browser(_) => "Browser",
            FetchError::Parse(_) => "Parse",
            FetchError::Other(_) => "Other",
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        FetchError::Http {
            status,
            message: message.into(),
        }
    }
}

/// 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON 序列化失败 ({path}): {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("CSV 写入失败 ({path}): {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

// ========== 便捷构造函数 ==========

impl ConfigError {
    /// 创建缺键错误
    pub fn missing_key(key: impl Into<String>) -> Self {
        ConfigError::MissingKey { key: key.into() }
    }

    /// 创建环境变量解析错误
    pub fn env_parse(
        var_name: impl Into<String>,
        value: impl Into<String>,
        expected_type: impl Into<String>,
    ) -> Self {
        ConfigError::EnvVarParseFailed {
            var_name: var_name.into(),
            value: value.into(),
            expected_type: expected_type.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

//! 浏览器驱动能力 - 基础设施层
//!
//! 挑战处理器和浏览器站点抓取器只依赖这里的 trait，不直接接触 chromiumoxide，
//! 测试里用内存实现替换真实浏览器。

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// 页面操作错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("页面操作超时 (timeout): {0}")]
    Timeout(String),
    #[error("导航失败: {0}")]
    Navigation(String),
    #[error("浏览器协议错误: {0}")]
    Protocol(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// 元素在视口中的位置（CSS 像素）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 按比例取框内一点，`(0.5, 0.5)` 为中心
    pub fn point_at(&self, fx: f64, fy: f64) -> (f64, f64) {
        (self.x + self.width * fx, self.y + self.height * fy)
    }

    pub fn is_larger_than(&self, width: f64, height: f64) -> bool {
        self.width > width && self.height > height
    }
}

/// 查询到的元素快照
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ElementInfo {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    /// 不可见元素没有位置
    #[serde(default, rename = "rect")]
    pub bounding_box: Option<BoundingBox>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// 属性值，缺失时为空串
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    pub fn is_visible(&self) -> bool {
        self.bounding_box.is_some()
    }
}

/// 单个页面的操作能力
///
/// 同一个页面实例不能并发调用挑战处理器。
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到 URL，超过 `timeout` 视为超时
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    /// 页面 HTML
    async fn content(&self) -> DriverResult<String>;

    async fn title(&self) -> DriverResult<String>;

    /// 查询所有匹配选择器的元素
    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementInfo>>;

    /// 匹配选择器的元素数量
    async fn count(&self, selector: &str) -> DriverResult<usize> {
        Ok(self.query_all(selector).await?.len())
    }

    /// 文本包含 `needle` 的最内层可见元素
    async fn find_by_text(&self, needle: &str) -> DriverResult<Option<ElementInfo>>;

    /// 在视口坐标处模拟鼠标点击
    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()>;

    /// 模拟按键（按下再抬起）
    async fn press_key(&self, key: &str) -> DriverResult<()>;

    /// 执行 JS 并返回 JSON 结果
    async fn eval(&self, script: &str) -> DriverResult<JsonValue>;

    async fn close(&self) -> DriverResult<()>;
}

/// 浏览器会话能力：创建新页面
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 创建新页面，`user_agent` 非空时覆盖默认 UA
    async fn new_page(&self, user_agent: Option<&str>) -> DriverResult<Box<dyn PageDriver>>;
}

/// 执行 JS 并反序列化为指定类型
///
/// # 参数
/// - `page`: 页面
/// - `script`: 要执行的 JavaScript 代码
pub async fn eval_as<T: DeserializeOwned>(page: &dyn PageDriver, script: &str) -> DriverResult<T> {
    let value = page.eval(script).await?;
    serde_json::from_value(value).map_err(|e| DriverError::Protocol(format!("结果反序列化失败: {e}")))
}

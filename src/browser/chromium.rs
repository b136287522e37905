//! chromiumoxide 实现
//!
//! 两种获取浏览器的方式：
//! - [`ChromiumSession::connect`]：连接到已开启远程调试端口的浏览器
//! - [`ChromiumSession::launch_headless`]：自行启动无头浏览器
//!
//! DOM 查询统一通过一次 `evaluate` 完成，返回属性、文本和视口坐标。

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::driver::{BrowserSession, DriverError, DriverResult, ElementInfo, PageDriver};
use crate::error::BrowserError;
use crate::utils::logging::mask_credentials;

/// 元素文本上限，防止整页文本塞进结果
const MAX_ELEMENT_TEXT: usize = 20_000;

/// 无头浏览器固定启动参数
const HEADLESS_ARGS: [&str; 5] = [
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--window-size=1920,1080",
];

/// 浏览器会话
///
/// 持有 `Browser` 和后台事件处理任务，drop 时停止事件处理。
pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    /// 连接到本地已开启远程调试的浏览器
    ///
    /// # 参数
    /// - `port`: 远程调试端口
    pub async fn connect(port: u16) -> Result<Self, BrowserError> {
        let browser_url = format!("http://localhost:{}", port);
        info!("🔗 正在连接到浏览器: {}", browser_url);

        let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
            error!("连接浏览器失败: {}", e);
            BrowserError::ConnectionFailed {
                port,
                message: e.to_string(),
            }
        })?;
        debug!("浏览器连接成功");

        Ok(Self::with_handler(browser, handler).await)
    }

    /// 启动无头浏览器
    ///
    /// # 参数
    /// - `executable`: 浏览器可执行文件，`None` 时由 chromiumoxide 自动查找
    /// - `proxy`: 代理地址，作为 `--proxy-server` 传给浏览器
    pub async fn launch_headless(
        executable: Option<&Path>,
        proxy: Option<&str>,
    ) -> Result<Self, BrowserError> {
        info!("🚀 启动无头浏览器...");
        if let Some(proxy) = proxy {
            info!("🌐 浏览器代理: {}", mask_credentials(proxy));
        }

        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .args(headless_args(proxy));
        if let Some(path) = executable {
            debug!("浏览器路径: {}", path.display());
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(|e| {
            error!("配置无头浏览器失败: {}", e);
            BrowserError::ConfigurationFailed(e)
        })?;

        let (browser, handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动无头浏览器失败: {}", e);
            BrowserError::LaunchFailed(e.to_string())
        })?;
        debug!("无头浏览器启动成功");

        Ok(Self::with_handler(browser, handler).await)
    }

    async fn with_handler(browser: Browser, mut handler: chromiumoxide::Handler) -> Self {
        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 等待浏览器状态同步
        sleep(Duration::from_millis(300)).await;

        Self {
            browser,
            handler_task,
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self, user_agent: Option<&str>) -> DriverResult<Box<dyn PageDriver>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Protocol(format!("创建页面失败: {}", e)))?;

        if let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) {
            page.set_user_agent(SetUserAgentOverrideParams::new(ua.to_string()))
                .await
                .map_err(|e| DriverError::Protocol(format!("设置 User-Agent 失败: {}", e)))?;
        }

        Ok(Box::new(ChromiumPage::new(page)))
    }
}

/// 单个页面
///
/// 持有唯一的 `Page` 资源，只暴露 [`PageDriver`] 能力。
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, key: &str) -> DriverResult<()> {
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key)
            .code(key);
        if let Some(code) = virtual_key_code(key) {
            builder = builder.windows_virtual_key_code(code);
        }
        let params = builder.build().map_err(DriverError::Protocol)?;
        self.page.execute(params).await.map_err(protocol_error)?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation(format!("{}: {}", url, e))),
            Err(_) => Err(DriverError::Timeout(format!(
                "导航超过 {} 秒: {}",
                timeout.as_secs(),
                url
            ))),
        }
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(protocol_error)?
            .unwrap_or_default())
    }

    async fn content(&self) -> DriverResult<String> {
        self.page.content().await.map_err(protocol_error)
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(protocol_error)?
            .unwrap_or_default())
    }

    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        let value = self.eval(&query_script(selector)).await?;
        serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("元素结果解析失败: {}", e)))
    }

    async fn find_by_text(&self, needle: &str) -> DriverResult<Option<ElementInfo>> {
        let value = self.eval(&find_text_script(needle)).await?;
        serde_json::from_value(value)
            .map_err(|e| DriverError::Protocol(format!("元素结果解析失败: {}", e)))
    }

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        self.page
            .click(Point { x, y })
            .await
            .map_err(protocol_error)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn eval(&self, script: &str) -> DriverResult<JsonValue> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(protocol_error)?;
        result
            .into_value()
            .map_err(|e| DriverError::Protocol(format!("JS 结果解析失败: {}", e)))
    }

    async fn close(&self) -> DriverResult<()> {
        self.page.clone().close().await.map_err(protocol_error)
    }
}

fn protocol_error(e: chromiumoxide::error::CdpError) -> DriverError {
    let message = e.to_string();
    if message.to_lowercase().contains("timeout") {
        DriverError::Timeout(message)
    } else {
        DriverError::Protocol(message)
    }
}

fn virtual_key_code(key: &str) -> Option<i64> {
    match key {
        "Escape" => Some(27),
        "Enter" => Some(13),
        "Tab" => Some(9),
        _ => None,
    }
}

/// JS 字符串字面量
fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn query_script(selector: &str) -> String {
    format!(
        r#"(() => {{
    const out = [];
    let nodes;
    try {{ nodes = document.querySelectorAll({sel}); }} catch (e) {{ return out; }}
    for (const el of nodes) {{
        const attributes = {{}};
        for (const a of el.attributes) attributes[a.name] = a.value;
        const r = el.getBoundingClientRect();
        const visible = r.width > 0 && r.height > 0;
        out.push({{
            attributes,
            text: (el.innerText || el.textContent || '').trim().slice(0, {max}),
            rect: visible ? {{ x: r.x, y: r.y, width: r.width, height: r.height }} : null
        }});
    }}
    return out;
}})()"#,
        sel = js_string(selector),
        max = MAX_ELEMENT_TEXT,
    )
}

fn find_text_script(needle: &str) -> String {
    format!(
        r#"(() => {{
    const needle = {needle}.toLowerCase();
    let best = null;
    let bestArea = Infinity;
    for (const el of document.querySelectorAll('body *')) {{
        const text = (el.innerText || '').toLowerCase();
        if (!text.includes(needle)) continue;
        const r = el.getBoundingClientRect();
        if (r.width <= 0 || r.height <= 0) continue;
        const area = r.width * r.height;
        if (area < bestArea) {{
            bestArea = area;
            best = {{
                attributes: {{}},
                text: el.innerText.trim().slice(0, 500),
                rect: {{ x: r.x, y: r.y, width: r.width, height: r.height }}
            }};
        }}
    }}
    return best;
}})()"#,
        needle = js_string(needle),
    )
}

/// 启动参数，有代理时追加 `--proxy-server`
fn headless_args(proxy: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = HEADLESS_ARGS.iter().map(|a| a.to_string()).collect();
    if let Some(proxy) = proxy.map(str::trim).filter(|p| !p.is_empty()) {
        args.push(format!("--proxy-server={}", proxy));
    }
    args
}

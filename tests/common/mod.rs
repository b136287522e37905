//! 集成测试共用的脚本化页面、会话和抓取器
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use solar_leads::browser::{
    BoundingBox, BrowserSession, DriverError, DriverResult, ElementInfo, PageDriver,
};
use solar_leads::error::FetchError;
use solar_leads::models::{Posting, SearchTerm, SourceName};
use solar_leads::sources::{FetchOutcome, SiteFetcher};

// ========== 页面 ==========

pub fn element(attrs: &[(&str, &str)], text: &str, bbox: Option<BoundingBox>) -> ElementInfo {
    ElementInfo {
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        text: text.to_string(),
        bounding_box: bbox,
    }
}

pub fn visible(text: &str) -> ElementInfo {
    element(&[], text, Some(BoundingBox::new(10.0, 10.0, 200.0, 40.0)))
}

/// 页面某一时刻的样子
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub title: String,
    /// 依次返回的 HTML，最后一项保持不变
    pub contents: VecDeque<String>,
    /// 选择器（完全相同的字符串）→ 元素
    pub elements: HashMap<String, Vec<ElementInfo>>,
    /// 卡片脚本的返回值
    pub cards: JsonValue,
}

impl PageState {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            cards: json!([]),
            ..Default::default()
        }
    }

    pub fn html(mut self, content: &str) -> Self {
        self.contents.push_back(content.to_string());
        self
    }

    pub fn with(mut self, selector: &str, element: ElementInfo) -> Self {
        self.elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
        self
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn cards(mut self, cards: JsonValue) -> Self {
        self.cards = cards;
        self
    }
}

/// 按脚本变化的页面
#[derive(Default)]
pub struct ScriptedPage {
    state: Mutex<PageState>,
    /// 导航地址 → 新状态
    routes: Mutex<HashMap<String, PageState>>,
    /// 第 N 次点击后切换到的状态
    after_clicks: Mutex<Option<(usize, PageState)>>,
    clicks: Mutex<Vec<(f64, f64)>>,
    visited: Mutex<Vec<String>>,
    keys: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedPage {
    pub fn new(state: PageState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ..Default::default()
        })
    }

    pub fn route(self: &Arc<Self>, url: &str, state: PageState) -> Arc<Self> {
        self.routes.lock().unwrap().insert(url.to_string(), state);
        self.clone()
    }

    pub fn solve_after_clicks(self: &Arc<Self>, clicks: usize, state: PageState) -> Arc<Self> {
        *self.after_clicks.lock().unwrap() = Some((clicks, state));
        self.clone()
    }

    pub fn clicks(&self) -> Vec<(f64, f64)> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.visited.lock().unwrap().push(url.to_string());
        let routed = self.routes.lock().unwrap().get(url).cloned();
        let mut state = self.state.lock().unwrap();
        match routed {
            Some(next) => *state = next,
            None => state.url = url.to_string(),
        }
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn content(&self) -> DriverResult<String> {
        let mut state = self.state.lock().unwrap();
        let html = if state.contents.len() > 1 {
            state.contents.pop_front()
        } else {
            state.contents.front().cloned()
        };
        Ok(html.unwrap_or_default())
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().title.clone())
    }

    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .elements
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_text(&self, _needle: &str) -> DriverResult<Option<ElementInfo>> {
        Ok(None)
    }

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        let count = {
            let mut clicks = self.clicks.lock().unwrap();
            clicks.push((x, y));
            clicks.len()
        };
        let mut after = self.after_clicks.lock().unwrap();
        if matches!(after.as_ref(), Some((n, _)) if *n == count) {
            if let Some((_, next)) = after.take() {
                *self.state.lock().unwrap() = next;
            }
        }
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> DriverResult<()> {
        self.keys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn eval(&self, script: &str) -> DriverResult<JsonValue> {
        if script.contains("const cards") {
            return Ok(self.state.lock().unwrap().cards.clone());
        }
        Ok(json!(0))
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 让测试在抓取器关闭页面后仍能检查页面
pub struct SharedPage(pub Arc<ScriptedPage>);

#[async_trait]
impl PageDriver for SharedPage {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        self.0.goto(url, timeout).await
    }
    async fn current_url(&self) -> DriverResult<String> {
        self.0.current_url().await
    }
    async fn content(&self) -> DriverResult<String> {
        self.0.content().await
    }
    async fn title(&self) -> DriverResult<String> {
        self.0.title().await
    }
    async fn query_all(&self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        self.0.query_all(selector).await
    }
    async fn find_by_text(&self, needle: &str) -> DriverResult<Option<ElementInfo>> {
        self.0.find_by_text(needle).await
    }
    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        self.0.click_at(x, y).await
    }
    async fn press_key(&self, key: &str) -> DriverResult<()> {
        self.0.press_key(key).await
    }
    async fn eval(&self, script: &str) -> DriverResult<JsonValue> {
        self.0.eval(script).await
    }
    async fn close(&self) -> DriverResult<()> {
        self.0.close().await
    }
}

/// 每次都返回同一个脚本化页面的会话
pub struct ScriptedSession {
    pub page: Arc<ScriptedPage>,
    pub user_agents: Mutex<Vec<String>>,
    pub fail_with: Option<DriverError>,
}

impl ScriptedSession {
    pub fn new(page: Arc<ScriptedPage>) -> Self {
        Self {
            page,
            user_agents: Mutex::new(Vec::new()),
            fail_with: None,
        }
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn new_page(&self, user_agent: Option<&str>) -> DriverResult<Box<dyn PageDriver>> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        if let Some(ua) = user_agent {
            self.user_agents.lock().unwrap().push(ua.to_string());
        }
        Ok(Box::new(SharedPage(self.page.clone())))
    }
}

// ========== 抓取器 ==========

pub fn posting(source: SourceName, term: &SearchTerm, company: &str) -> Posting {
    Posting {
        title: "Solar Designer".to_string(),
        company: company.to_string(),
        location: "Denver, CO".to_string(),
        description: String::new(),
        url: format!("https://jobs.example.com/{}", company.to_lowercase()),
        source,
        search_term: term.clone(),
    }
}

/// 一次抓取的脚本
#[derive(Debug, Clone)]
pub enum Step {
    Found(usize),
    Fail(FetchError),
}

/// 按脚本返回结果的抓取器，脚本用完后返回空结果
pub struct ScriptedFetcher {
    source: SourceName,
    steps: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new(source: SourceName, steps: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                source,
                steps: Mutex::new(steps.into()),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl SiteFetcher for ScriptedFetcher {
    fn source(&self) -> SourceName {
        self.source
    }

    async fn fetch(&self, term: &SearchTerm) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Found(n)) => Ok(FetchOutcome::new(
                (0..n)
                    .map(|i| posting(self.source, term, &format!("Company{i}")))
                    .collect(),
            )),
            None => Ok(FetchOutcome::default()),
        }
    }
}

pub fn terms(names: &[&str]) -> Vec<SearchTerm> {
    names.iter().map(|n| SearchTerm::new(*n)).collect()
}

//! 验证控件定位策略
//!
//! 按从最具体到最宽泛的顺序排列，处理器每轮取第一个定位成功的策略点击。

use async_trait::async_trait;

use crate::browser::{BoundingBox, DriverResult, ElementInfo, PageDriver};

/// 已知的验证 iframe 选择器
pub const CHALLENGE_IFRAME_SELECTORS: &[&str] = &[
    r#"iframe[src*="challenges.cloudflare.com"]"#,
    r#"iframe[src*="cloudflare.com/cdn-cgi"]"#,
    r#"iframe[src*="turnstile"]"#,
    r#"iframe[title*="Cloudflare"]"#,
    r#"iframe[title*="challenge"]"#,
    ".cf-turnstile iframe",
    "[data-turnstile] iframe",
    r#"div[class*="turnstile"] iframe"#,
];

/// 验证控件容器选择器
pub const WIDGET_CONTAINER_SELECTORS: &[&str] = &[
    ".cf-turnstile",
    "[data-turnstile-widget]",
    r#"div[class*="turnstile"]"#,
    r#"div[id*="turnstile"]"#,
    r#"input[type="checkbox"][name*="cf"]"#,
];

/// 通用复选框选择器
pub const CHECKBOX_SELECTORS: &[&str] = &[
    r#"input[type="checkbox"]"#,
    "#challenge-form input",
    ".challenge-form input",
    r#"[class*="checkbox"]"#,
    r#"span[class*="mark"]"#,
];

/// 验证提示文字
pub const VERIFY_LABEL_TEXT: &str = "Verify you are human";

/// 占位 iframe 的最小尺寸（宽 × 高）
const MIN_WIDGET_SIZE: (f64, f64) = (50.0, 30.0);

/// 文字左侧到复选框的距离
const TEXT_LEFT_OFFSET: f64 = 20.0;

/// 定位结果
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedElement {
    /// 命中的策略名
    pub strategy: &'static str,
    /// 命中的选择器或描述
    pub matched: String,
    pub bounding_box: BoundingBox,
    /// 点击坐标
    pub click_point: (f64, f64),
}

impl LocatedElement {
    /// 控件框内的复选框位置：左起九分之一宽度、垂直居中
    fn in_widget(strategy: &'static str, matched: String, bbox: BoundingBox) -> Self {
        Self {
            strategy,
            matched,
            bounding_box: bbox,
            click_point: bbox.point_at(1.0 / 9.0, 0.5),
        }
    }

    fn centered(strategy: &'static str, matched: String, bbox: BoundingBox) -> Self {
        Self {
            strategy,
            matched,
            bounding_box: bbox,
            click_point: bbox.point_at(0.5, 0.5),
        }
    }
}

/// 定位策略
#[async_trait]
pub trait LocatorStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 尝试定位可点击的验证控件
    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>>;
}

/// 默认策略顺序
pub fn default_strategies() -> Vec<Box<dyn LocatorStrategy>> {
    vec![
        Box::new(KnownIframe),
        Box::new(ProviderIframe),
        Box::new(PlaceholderIframe),
        Box::new(WidgetContainer),
        Box::new(GenericCheckbox),
        Box::new(TextProximity),
    ]
}

/// 第一个匹配选择器的可见元素
async fn first_visible(
    page: &dyn PageDriver,
    selectors: &[&str],
) -> DriverResult<Option<(String, BoundingBox)>> {
    for selector in selectors {
        let elements = page.query_all(selector).await?;
        if let Some(bbox) = elements.iter().find_map(|e| e.bounding_box) {
            return Ok(Some((selector.to_string(), bbox)));
        }
    }
    Ok(None)
}

// ========== 1. 已知 iframe 地址 ==========

pub struct KnownIframe;

#[async_trait]
impl LocatorStrategy for KnownIframe {
    fn name(&self) -> &'static str {
        "known_iframe"
    }

    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>> {
        Ok(first_visible(page, CHALLENGE_IFRAME_SELECTORS)
            .await?
            .map(|(sel, bbox)| LocatedElement::in_widget(self.name(), sel, bbox)))
    }
}

// ========== 2. 属性提到验证服务的 iframe ==========

pub struct ProviderIframe;

fn mentions_provider(iframe: &ElementInfo) -> bool {
    let src = iframe.attr_or_empty("src").to_lowercase();
    let title = iframe.attr_or_empty("title").to_lowercase();
    src.contains("cloudflare") || src.contains("turnstile") || title.contains("challenge")
}

#[async_trait]
impl LocatorStrategy for ProviderIframe {
    fn name(&self) -> &'static str {
        "provider_iframe"
    }

    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>> {
        let iframes = page.query_all("iframe").await?;
        Ok(iframes.iter().enumerate().find_map(|(idx, iframe)| {
            let bbox = iframe.bounding_box?;
            mentions_provider(iframe).then(|| {
                LocatedElement::in_widget(self.name(), format!("iframe[{}]", idx), bbox)
            })
        }))
    }
}

// ========== 3. 空地址的占位 iframe ==========

pub struct PlaceholderIframe;

fn is_placeholder(iframe: &ElementInfo) -> bool {
    let src = iframe.attr_or_empty("src").to_lowercase();
    if src.contains("google") || src.contains("facebook") {
        return false;
    }
    src.is_empty() || src.starts_with("blob:") || src == "about:blank"
}

#[async_trait]
impl LocatorStrategy for PlaceholderIframe {
    fn name(&self) -> &'static str {
        "placeholder_iframe"
    }

    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>> {
        let iframes = page.query_all("iframe").await?;
        let (min_w, min_h) = MIN_WIDGET_SIZE;
        Ok(iframes.iter().enumerate().find_map(|(idx, iframe)| {
            let bbox = iframe.bounding_box?;
            (is_placeholder(iframe) && bbox.is_larger_than(min_w, min_h)).then(|| {
                LocatedElement::in_widget(
                    self.name(),
                    format!("iframe[{}] {:.0}x{:.0}", idx, bbox.width, bbox.height),
                    bbox,
                )
            })
        }))
    }
}

// ========== 4. 控件容器 ==========

pub struct WidgetContainer;

#[async_trait]
impl LocatorStrategy for WidgetContainer {
    fn name(&self) -> &'static str {
        "widget_container"
    }

    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>> {
        Ok(first_visible(page, WIDGET_CONTAINER_SELECTORS)
            .await?
            .map(|(sel, bbox)| LocatedElement::in_widget(self.name(), sel, bbox)))
    }
}

// ========== 5. 通用复选框 ==========

pub struct GenericCheckbox;

#[async_trait]
impl LocatorStrategy for GenericCheckbox {
    fn name(&self) -> &'static str {
        "generic_checkbox"
    }

    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>> {
        Ok(first_visible(page, CHECKBOX_SELECTORS)
            .await?
            .map(|(sel, bbox)| LocatedElement::centered(self.name(), sel, bbox)))
    }
}

// ========== 6. 提示文字左侧 ==========

pub struct TextProximity;

#[async_trait]
impl LocatorStrategy for TextProximity {
    fn name(&self) -> &'static str {
        "text_proximity"
    }

    async fn try_locate(&self, page: &dyn PageDriver) -> DriverResult<Option<LocatedElement>> {
        let Some(label) = page.find_by_text(VERIFY_LABEL_TEXT).await? else {
            return Ok(None);
        };
        Ok(label.bounding_box.map(|bbox| {
            let (_, y) = bbox.point_at(0.0, 0.5);
            LocatedElement {
                strategy: self.name(),
                matched: VERIFY_LABEL_TEXT.to_string(),
                bounding_box: bbox,
                click_point: ((bbox.x - TEXT_LEFT_OFFSET).max(0.0), y),
            }
        }))
    }
}

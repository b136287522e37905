//! 弹窗清理
//!
//! 登录提示、邮件订阅、Cookie 横幅会挡住验证控件和职位卡片。
//! 所有步骤尽力而为，任何一步失败都不影响后续步骤。

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::driver::PageDriver;

/// 移除遮罩层和订阅弹窗
const REMOVE_OVERLAYS_JS: &str = r#"(() => {
    let removed = 0;
    document.querySelectorAll('[data-focus-lock-disabled]').forEach(el => { el.remove(); removed++; });
    document.querySelectorAll('[role="presentation"][class*="bg-black"], [class*="bg-opacity-50"]').forEach(el => {
        if (el.classList.contains('fixed') || el.classList.contains('inset-0')) { el.remove(); removed++; }
    });
    document.querySelectorAll('[class*="modal"][class*="fixed"], [class*="overlay"][class*="fixed"]').forEach(el => {
        el.remove(); removed++;
    });
    return removed;
})()"#;

/// 移除 Google 一键登录 iframe
const REMOVE_GOOGLE_SIGNIN_JS: &str = r#"(() => {
    let removed = 0;
    document.querySelectorAll('iframe[src*="accounts.google.com"]').forEach(el => {
        (el.parentElement || el).remove(); removed++;
    });
    document.querySelectorAll('[id*="credential_picker"], [class*="g_id"], [id*="google"]').forEach(el => {
        if (el.querySelector('iframe') || el.tagName === 'IFRAME') { el.remove(); removed++; }
    });
    return removed;
})()"#;

/// 移除固定定位、高层级的登录/注册横幅
const REMOVE_LOGIN_BANNERS_JS: &str = r#"(() => {
    let removed = 0;
    document.querySelectorAll('[class*="login" i], [class*="signup" i], [class*="signin" i], [class*="register" i]').forEach(el => {
        const style = window.getComputedStyle(el);
        if ((style.position === 'fixed' || style.position === 'absolute') && parseInt(style.zIndex) > 100) {
            el.remove(); removed++;
        }
    });
    return removed;
})()"#;

const MODAL_SELECTOR: &str = r#"[role="dialog"], [class*="modal" i], [class*="overlay" i]"#;
const GOOGLE_IFRAME_SELECTOR: &str = r#"iframe[src*="accounts.google.com"]"#;

const CLOSE_BUTTON_SELECTORS: &[&str] = &[
    r#"button[aria-label*="close" i]"#,
    r#"button[aria-label*="dismiss" i]"#,
    r#"[class*="close" i]:not(input)"#,
];

/// 尽力关闭页面上的弹窗
///
/// # 参数
/// - `page`: 页面
/// - `pause`: 每步操作后的等待时间
///
/// # 返回
/// 执行成功的清理动作数
pub async fn dismiss_popups(page: &dyn PageDriver, pause: Duration) -> usize {
    let mut actions = 0;

    for _ in 0..3 {
        if page.press_key("Escape").await.is_ok() {
            actions += 1;
        }
        sleep(pause).await;
    }

    actions += removed_count(page, REMOVE_OVERLAYS_JS).await;

    // 仍有可见弹窗时点击左上角背景
    if has_visible(page, MODAL_SELECTOR).await {
        debug!("弹窗仍可见，点击背景关闭");
        if page.click_at(5.0, 5.0).await.is_ok() {
            actions += 1;
        }
        sleep(pause).await;
        let _ = page.press_key("Escape").await;
    }

    for selector in CLOSE_BUTTON_SELECTORS {
        let Ok(elements) = page.query_all(selector).await else {
            continue;
        };
        let Some(bbox) = elements.iter().find_map(|e| e.bounding_box) else {
            continue;
        };
        let (x, y) = bbox.point_at(0.5, 0.5);
        if page.click_at(x, y).await.is_ok() {
            debug!("点击关闭按钮: {}", selector);
            actions += 1;
            sleep(pause).await;
            if !has_visible(page, r#"[role="dialog"]"#).await {
                return actions;
            }
        }
    }

    if page.count(GOOGLE_IFRAME_SELECTOR).await.unwrap_or(0) > 0 {
        let _ = page.press_key("Escape").await;
        sleep(pause).await;
        let removed = removed_count(page, REMOVE_GOOGLE_SIGNIN_JS).await;
        if removed > 0 {
            debug!("已移除 Google 登录提示");
        }
        actions += removed;
    }

    actions + removed_count(page, REMOVE_LOGIN_BANNERS_JS).await
}

async fn removed_count(page: &dyn PageDriver, script: &str) -> usize {
    page.eval(script)
        .await
        .ok()
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(0)
}

async fn has_visible(page: &dyn PageDriver, selector: &str) -> bool {
    page.query_all(selector)
        .await
        .map(|elements| elements.iter().any(|e| e.is_visible()))
        .unwrap_or(false)
}

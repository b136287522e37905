//! 浏览器层
//!
//! - `driver`：页面能力 trait（供挑战处理器和浏览器抓取器使用）
//! - `chromium`：基于 chromiumoxide 的实现
//! - `popups`：弹窗清理

pub mod chromium;
pub mod driver;
pub mod popups;

pub use chromium::{ChromiumPage, ChromiumSession};
pub use driver::{
    eval_as, BoundingBox, BrowserSession, DriverError, DriverResult, ElementInfo, PageDriver,
};
pub use popups::dismiss_popups;

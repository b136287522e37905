//! 验证挑战处理器
//!
//! 对单个浏览器页面运行的状态机：检测反自动化验证页，按有限步骤尝试通过，
//! 报告最终状态。
//!
//! ## 状态
//!
//! ```text
//! Unchallenged ──┬──> AutoVerifying ──┬──> Solved
//!                │                    └──> AwaitingInteraction
//!                └──> AwaitingInteraction ──┬──> Solved
//!                                           └──> Failed
//! ```
//!
//! `Solved` 和 `Failed` 是终态，进入后不再转换。
//! 同一个页面实例不能并发运行处理器。

pub mod locators;

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{dismiss_popups, PageDriver};
pub use locators::{default_strategies, LocatedElement, LocatorStrategy};

/// 自动验证页标记（小写）
pub const AUTO_VERIFY_MARKERS: &[&str] = &["verifying...", "this may take a few seconds"];

/// 需要交互的验证页标记（小写）
pub const INTERACTIVE_MARKERS: &[&str] = &[
    "verify you are human",
    "checking your browser",
    "needs to review",
];

/// 验证控件选择器
pub const CHALLENGE_WIDGET_SELECTOR: &str = r#"iframe[src*="challenges.cloudflare.com"], iframe[src*="turnstile"], .cf-turnstile, [data-turnstile]"#;

/// 挑战状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeState {
    /// 未检测到验证页
    Unchallenged,
    /// 自动验证中，无需操作
    AutoVerifying,
    /// 需要点击复选框或控件
    AwaitingInteraction,
    Solved,
    Failed,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeState::Unchallenged => "unchallenged",
            ChallengeState::AutoVerifying => "auto_verifying",
            ChallengeState::AwaitingInteraction => "awaiting_interaction",
            ChallengeState::Solved => "solved",
            ChallengeState::Failed => "failed",
        }
    }

    /// `Solved` / `Failed` 为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChallengeState::Solved | ChallengeState::Failed)
    }

    /// 可以读取页面内容
    pub fn is_success(&self) -> bool {
        matches!(self, ChallengeState::Unchallenged | ChallengeState::Solved)
    }

    pub fn can_transition_to(&self, next: ChallengeState) -> bool {
        use ChallengeState::*;
        matches!(
            (self, next),
            (Unchallenged, AutoVerifying)
                | (Unchallenged, AwaitingInteraction)
                | (AutoVerifying, Solved)
                | (AutoVerifying, AwaitingInteraction)
                | (AwaitingInteraction, Solved)
                | (AwaitingInteraction, Failed)
        )
    }
}

impl std::fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态机，记录经过的每个状态
#[derive(Debug, Clone)]
pub struct ChallengeMachine {
    state: ChallengeState,
    history: Vec<ChallengeState>,
}

impl Default for ChallengeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeMachine {
    pub fn new() -> Self {
        Self {
            state: ChallengeState::Unchallenged,
            history: vec![ChallengeState::Unchallenged],
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn history(&self) -> &[ChallengeState] {
        &self.history
    }

    /// 尝试转换状态，非法转换（包括离开终态）返回 false 且状态不变
    pub fn transition(&mut self, next: ChallengeState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!("忽略非法状态转换: {} -> {}", self.state, next);
            return false;
        }
        debug!("挑战状态: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
        true
    }
}

/// 处理器的等待时间
#[derive(Debug, Clone, Copy)]
pub struct ResolverTimings {
    /// 自动验证轮询间隔
    pub poll_interval: Duration,
    /// 自动验证最多轮询次数
    pub max_polls: u32,
    /// 每轮交互前的等待
    pub round_wait: Duration,
    /// 点击后等待验证完成
    pub settle: Duration,
    /// 弹窗清理每步的等待
    pub popup_pause: Duration,
}

impl Default for ResolverTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 15,
            round_wait: Duration::from_secs(2),
            settle: Duration::from_secs(5),
            popup_pause: Duration::from_millis(200),
        }
    }
}

impl ResolverTimings {
    /// 无等待（测试用）
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            max_polls: 15,
            round_wait: Duration::ZERO,
            settle: Duration::ZERO,
            popup_pause: Duration::ZERO,
        }
    }
}

/// 一次处理的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeReport {
    /// 入口处是否检测到验证页
    pub detected: bool,
    pub final_state: ChallengeState,
    pub history: Vec<ChallengeState>,
    /// 交互轮数
    pub rounds: u32,
    /// 最后一次点击使用的策略
    pub matched_locator: Option<&'static str>,
}

impl ChallengeReport {
    fn from_machine(machine: ChallengeMachine, rounds: u32, matched: Option<&'static str>) -> Self {
        Self {
            detected: machine.history.len() > 1,
            final_state: machine.state,
            history: machine.history,
            rounds,
            matched_locator: matched,
        }
    }

    pub fn is_success(&self) -> bool {
        self.final_state.is_success()
    }

    /// 诊断用：未检测到时为 None
    pub fn solved(&self) -> Option<bool> {
        self.detected.then(|| self.final_state == ChallengeState::Solved)
    }
}

/// 页面快照：当前 URL 和小写 HTML
struct PageSnapshot {
    url: String,
    content: String,
}

impl PageSnapshot {
    async fn take(page: &dyn PageDriver) -> Self {
        Self {
            url: page.current_url().await.unwrap_or_default(),
            content: page.content().await.unwrap_or_default().to_lowercase(),
        }
    }

    fn auto_verifying(&self) -> bool {
        AUTO_VERIFY_MARKERS.iter().any(|m| self.content.contains(m))
    }

    fn interactive(&self) -> bool {
        INTERACTIVE_MARKERS.iter().any(|m| self.content.contains(m))
    }
}

/// 挑战处理器
pub struct ChallengeResolver {
    strategies: Vec<Box<dyn LocatorStrategy>>,
    timings: ResolverTimings,
    max_rounds: u32,
}

impl Default for ChallengeResolver {
    fn default() -> Self {
        Self::new(default_strategies(), ResolverTimings::default())
    }
}

impl ChallengeResolver {
    pub const DEFAULT_ROUNDS: u32 = 3;

    pub fn new(strategies: Vec<Box<dyn LocatorStrategy>>, timings: ResolverTimings) -> Self {
        Self {
            strategies,
            timings,
            max_rounds: Self::DEFAULT_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// 检测并尝试通过验证页
    ///
    /// # 参数
    /// - `page`: 已导航到目标地址的页面
    /// - `target_selector`: 目标内容（如职位卡片）的选择器，出现即视为通过
    ///
    /// # 返回
    /// 处理报告，`final_state` 为 `Unchallenged` / `Solved` / `Failed`
    pub async fn resolve(&self, page: &dyn PageDriver, target_selector: &str) -> ChallengeReport {
        dismiss_popups(page, self.timings.popup_pause).await;

        let mut machine = ChallengeMachine::new();
        let initial = PageSnapshot::take(page).await;

        if has_any(page, target_selector).await {
            debug!("目标内容已可见，跳过验证检测");
            return ChallengeReport::from_machine(machine, 0, None);
        }

        if initial.auto_verifying() {
            info!("⏳ 检测到自动验证，等待完成...");
            machine.transition(ChallengeState::AutoVerifying);
            self.wait_auto_verification(page, &initial.url, target_selector, &mut machine)
                .await;
        } else if initial.interactive() || has_any(page, CHALLENGE_WIDGET_SELECTOR).await {
            info!("🛡️ 检测到验证控件");
            machine.transition(ChallengeState::AwaitingInteraction);
        } else {
            return ChallengeReport::from_machine(machine, 0, None);
        }

        if machine.state() != ChallengeState::AwaitingInteraction {
            return ChallengeReport::from_machine(machine, 0, None);
        }

        let (rounds, matched) = self
            .interact(page, &initial.url, target_selector, &mut machine)
            .await;

        match machine.state() {
            ChallengeState::Solved => info!("✅ 验证已通过（第 {} 轮）", rounds),
            _ => {
                warn!("❌ {} 轮后仍未通过验证", rounds);
                machine.transition(ChallengeState::Failed);
            }
        }
        ChallengeReport::from_machine(machine, rounds, matched)
    }

    /// 轮询自动验证，结束时状态为 `Solved` 或 `AwaitingInteraction`
    async fn wait_auto_verification(
        &self,
        page: &dyn PageDriver,
        initial_url: &str,
        target_selector: &str,
        machine: &mut ChallengeMachine,
    ) {
        for poll in 0..self.timings.max_polls {
            sleep(self.timings.poll_interval).await;

            let snapshot = PageSnapshot::take(page).await;
            if snapshot.url != initial_url {
                debug!("自动验证完成（URL 已变化）");
                machine.transition(ChallengeState::Solved);
                return;
            }
            if snapshot.auto_verifying() {
                if poll % 3 == 0 {
                    debug!("仍在验证中... (已等待 {} 次)", poll + 1);
                }
                continue;
            }
            if has_any(page, target_selector).await {
                debug!("自动验证完成（目标内容可见）");
                machine.transition(ChallengeState::Solved);
            } else if snapshot.interactive() || has_any(page, CHALLENGE_WIDGET_SELECTOR).await {
                debug!("自动验证转为交互验证");
                machine.transition(ChallengeState::AwaitingInteraction);
            } else {
                debug!("自动验证完成（验证标记消失）");
                machine.transition(ChallengeState::Solved);
            }
            return;
        }

        debug!("自动验证等待超时，尝试交互验证");
        machine.transition(ChallengeState::AwaitingInteraction);
    }

    /// 交互验证，最多 `max_rounds` 轮
    async fn interact(
        &self,
        page: &dyn PageDriver,
        initial_url: &str,
        target_selector: &str,
        machine: &mut ChallengeMachine,
    ) -> (u32, Option<&'static str>) {
        let mut matched = None;

        for round in 1..=self.max_rounds {
            sleep(self.timings.round_wait).await;

            let snapshot = PageSnapshot::take(page).await;
            if url_left_challenge(&snapshot.url, initial_url) {
                machine.transition(ChallengeState::Solved);
                return (round, matched);
            }
            if snapshot.auto_verifying() {
                debug!("第 {} 轮: 自动验证进行中，等待", round);
                sleep(self.timings.settle).await;
                let url = page.current_url().await.unwrap_or_default();
                if url_left_challenge(&url, initial_url) {
                    machine.transition(ChallengeState::Solved);
                    return (round, matched);
                }
                continue;
            }
            if self.cleared(page, target_selector).await {
                machine.transition(ChallengeState::Solved);
                return (round, matched);
            }

            let Some(located) = self.locate(page).await else {
                debug!("第 {} 轮: 未找到验证控件", round);
                continue;
            };
            matched = Some(located.strategy);
            let (x, y) = located.click_point;
            info!(
                "🖱️ 第 {} 轮: 通过 {} ({}) 点击 ({:.0}, {:.0})",
                round, located.strategy, located.matched, x, y
            );
            if let Err(e) = page.click_at(x, y).await {
                warn!("点击失败: {}", e);
                continue;
            }
            sleep(self.timings.settle).await;

            let url = page.current_url().await.unwrap_or_default();
            if url_left_challenge(&url, initial_url) || self.cleared(page, target_selector).await {
                machine.transition(ChallengeState::Solved);
                return (round, matched);
            }
        }

        (self.max_rounds, matched)
    }

    /// 目标内容可见，或验证标记和控件都已消失
    async fn cleared(&self, page: &dyn PageDriver, target_selector: &str) -> bool {
        if has_any(page, target_selector).await {
            return true;
        }
        let snapshot = PageSnapshot::take(page).await;
        !snapshot.interactive()
            && !snapshot.auto_verifying()
            && !has_any(page, CHALLENGE_WIDGET_SELECTOR).await
    }

    async fn locate(&self, page: &dyn PageDriver) -> Option<LocatedElement> {
        for strategy in &self.strategies {
            match strategy.try_locate(page).await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => {}
                Err(e) => debug!("定位策略 {} 出错: {}", strategy.name(), e),
            }
        }
        None
    }
}

fn url_left_challenge(url: &str, initial_url: &str) -> bool {
    url != initial_url && !url.to_lowercase().contains("challenge")
}

async fn has_any(page: &dyn PageDriver, selector: &str) -> bool {
    page.count(selector).await.map(|n| n > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChallengeState::*;

    #[test]
    fn terminal_states_are_sticky() {
        let mut machine = ChallengeMachine::new();
        assert!(machine.transition(AwaitingInteraction));
        assert!(machine.transition(Failed));
        assert!(!machine.transition(Solved));
        assert!(!machine.transition(AwaitingInteraction));
        assert_eq!(machine.state(), Failed);
        assert_eq!(machine.history(), &[Unchallenged, AwaitingInteraction, Failed]);
    }

    #[test]
    fn auto_verifying_cannot_fail_directly() {
        assert!(!AutoVerifying.can_transition_to(Failed));
        assert!(AutoVerifying.can_transition_to(AwaitingInteraction));
        assert!(!Unchallenged.can_transition_to(Solved));
    }

    #[test]
    fn report_solved_flag() {
        let report = ChallengeReport::from_machine(ChallengeMachine::new(), 0, None);
        assert!(!report.detected);
        assert_eq!(report.solved(), None);
        assert!(report.is_success());

        let mut machine = ChallengeMachine::new();
        machine.transition(AutoVerifying);
        machine.transition(Solved);
        let report = ChallengeReport::from_machine(machine, 0, None);
        assert_eq!(report.solved(), Some(true));
    }

    #[test]
    fn url_change_into_another_challenge_does_not_count() {
        assert!(url_left_challenge("https://a/jobs", "https://a/start"));
        assert!(!url_left_challenge("https://a/cdn-cgi/challenge", "https://a/start"));
        assert!(!url_left_challenge("https://a/start", "https://a/start"));
    }
}

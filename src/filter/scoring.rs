//! 资格评分引擎
//!
//! 纯函数：(描述, 公司名, 标题, 规则配置) → 评分结果。无 I/O、无状态、无随机性，
//! 同样的输入总是得到同样的结果。
//!
//! 评估顺序：公司黑名单 → 空描述 → 必需上下文 → 硬排除 → 六个加分层 → 阈值判定。
//! 前四步都是提前返回，结构化的 [`Verdict`] 记录了提前返回的原因。

use serde::Serialize;
use std::fmt;

use super::config::{RuleConfig, TITLE_WINDOW_CHARS};
use crate::models::Posting;

/// 黑名单与硬排除的固定分数
pub const VETO_SCORE: f64 = -100.0;

/// 加分层
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    Tier5,
    Tier6,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier1",
            Tier::Tier2 => "tier2",
            Tier::Tier3 => "tier3",
            Tier::Tier4 => "tier4",
            Tier::Tier5 => "tier5",
            Tier::Tier6 => "tier6",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 必需上下文命中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextLocation {
    Title,
    Description,
}

/// 评分结论
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Qualified,
    /// 公司名命中黑名单
    CompanyBlocked { term: String },
    NoDescription,
    MissingContext,
    /// 命中硬排除类别
    Excluded { category: String, pattern: String },
    BelowThreshold,
}

impl Verdict {
    /// 拒绝类别，用于过滤统计；合格时返回 None
    pub fn rejection_category(&self) -> Option<String> {
        match self {
            Verdict::Qualified => None,
            Verdict::CompanyBlocked { .. } => Some("company_blocklist".to_string()),
            Verdict::NoDescription => Some("no_description".to_string()),
            Verdict::MissingContext => Some("missing_context".to_string()),
            Verdict::Excluded { category, .. } => Some(format!("exclusions.{category}")),
            Verdict::BelowThreshold => Some("below_threshold".to_string()),
        }
    }

    /// 是否为一票否决（黑名单或硬排除）
    pub fn is_veto(&self) -> bool {
        matches!(self, Verdict::CompanyBlocked { .. } | Verdict::Excluded { .. })
    }
}

/// 单个职位的评分结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringResult {
    pub score: f64,
    pub qualified: bool,
    pub company_score: f64,
    pub role_score: f64,
    /// 按发生顺序排列，每条对应一条改变分数或导致提前返回的规则
    pub reasons: Vec<String>,
    pub threshold: f64,
    pub verdict: Verdict,
    /// 命中的加分层，按层序排列
    pub matched_tiers: Vec<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_location: Option<ContextLocation>,
}

impl ScoringResult {
    /// 命中的最高层（数字最小的层）
    pub fn highest_tier(&self) -> Option<Tier> {
        self.matched_tiers.iter().min().copied()
    }

    fn rejected(
        score: f64,
        company_score: f64,
        role_score: f64,
        reasons: Vec<String>,
        threshold: f64,
        verdict: Verdict,
    ) -> Self {
        Self {
            score,
            qualified: false,
            company_score,
            role_score,
            reasons,
            threshold,
            verdict,
            matched_tiers: Vec::new(),
            context_location: None,
        }
    }
}

/// 角色评分的中间结果
struct RoleScore {
    score: f64,
    reasons: Vec<String>,
    verdict: Option<Verdict>,
    matched_tiers: Vec<Tier>,
    context_location: Option<ContextLocation>,
}

impl RoleScore {
    fn short_circuit(score: f64, reason: String, verdict: Verdict) -> Self {
        Self {
            score,
            reasons: vec![reason],
            verdict: Some(verdict),
            matched_tiers: Vec::new(),
            context_location: None,
        }
    }
}

/// 对职位评分
///
/// # 参数
/// - `description`: 职位描述，可能为空
/// - `company`: 公司名（可选）
/// - `title`: 职位标题（可选，只参与必需上下文检查）
/// - `config`: 规则配置
pub fn score_job(
    description: &str,
    company: Option<&str>,
    title: Option<&str>,
    config: &RuleConfig,
) -> ScoringResult {
    let threshold = config.threshold;

    if let Some((score, reason, term)) = score_company(company, config) {
        return ScoringResult::rejected(
            score,
            score,
            0.0,
            vec![reason],
            threshold,
            Verdict::CompanyBlocked { term },
        );
    }

    let role = score_role(description, title, config);
    if let Some(verdict) = role.verdict {
        return ScoringResult {
            context_location: role.context_location,
            ..ScoringResult::rejected(role.score, 0.0, role.score, role.reasons, threshold, verdict)
        };
    }

    let total = role.score;
    let qualified = total >= threshold;
    ScoringResult {
        score: total,
        qualified,
        company_score: 0.0,
        role_score: role.score,
        reasons: role.reasons,
        threshold,
        verdict: if qualified {
            Verdict::Qualified
        } else {
            Verdict::BelowThreshold
        },
        matched_tiers: role.matched_tiers,
        context_location: role.context_location,
    }
}

/// 对抓取到的职位评分
pub fn score_posting(posting: &Posting, config: &RuleConfig) -> ScoringResult {
    score_job(
        &posting.description,
        Some(posting.company.as_str()),
        Some(posting.title.as_str()),
        config,
    )
}

/// 布尔包装，结果与 [`score_job`] 的 `qualified` 始终一致
pub fn qualifies(description: &str, company: Option<&str>, config: &RuleConfig) -> bool {
    score_job(description, company, None, config).qualified
}

/// 公司黑名单检查，命中时返回 (分数, 原因, 命中的黑名单项)
fn score_company(company: Option<&str>, config: &RuleConfig) -> Option<(f64, String, String)> {
    let name = company.filter(|c| !c.trim().is_empty())?;
    let lower = name.to_lowercase();

    config
        .company_blocklist
        .iter()
        .find(|blocked| lower.contains(blocked.as_str()))
        .map(|blocked| {
            (
                VETO_SCORE,
                format!("Company '{name}' in blocklist ({blocked})"),
                blocked.clone(),
            )
        })
}

fn score_role(description: &str, title: Option<&str>, config: &RuleConfig) -> RoleScore {
    if description.trim().is_empty() {
        return RoleScore::short_circuit(
            0.0,
            "No description provided".to_string(),
            Verdict::NoDescription,
        );
    }

    let desc_lower = description.to_lowercase();
    let title_lower = title.map(str::to_lowercase).unwrap_or_default();
    let title_window: String = desc_lower.chars().take(TITLE_WINDOW_CHARS).collect();

    // 必需上下文
    let required = &config.required_context.patterns;
    let in_title = contains_any(&title_lower, required).is_some();
    let in_desc = contains_any(&desc_lower, required).is_some();
    if !in_title && !in_desc {
        return RoleScore::short_circuit(
            0.0,
            "Missing required solar/PV context in title or description".to_string(),
            Verdict::MissingContext,
        );
    }

    let location = if in_title {
        ContextLocation::Title
    } else {
        ContextLocation::Description
    };
    let mut reasons = vec![match location {
        ContextLocation::Title => "+0: Has solar/PV context in title (required)".to_string(),
        ContextLocation::Description => {
            "+0: Has solar/PV context in description (required)".to_string()
        }
    }];

    // 硬排除，按配置顺序，第一个命中即返回
    for category in &config.exclusions {
        let text = match category.check_area {
            super::config::CheckArea::Title => title_window.as_str(),
            super::config::CheckArea::Description => desc_lower.as_str(),
        };
        if let Some(pattern) = contains_any(text, &category.patterns) {
            let mut excluded = RoleScore::short_circuit(
                VETO_SCORE,
                format!("Excluded: {} (matched '{}')", category.description, pattern),
                Verdict::Excluded {
                    category: category.name.clone(),
                    pattern: pattern.to_string(),
                },
            );
            excluded.context_location = Some(location);
            return excluded;
        }
    }

    let has_design_role = contains_any(&desc_lower, &config.design_role_indicators).is_some();
    let signals = &config.positive_signals;
    let mut score = 0.0;
    let mut matched_tiers = Vec::new();

    let mut apply = |tier: Tier, weight: f64, reason: String| {
        score += weight;
        reasons.push(reason);
        matched_tiers.push(tier);
    };

    if let Some(tier1) = &signals.tier1_tools {
        if let Some(pattern) = contains_any(&desc_lower, &tier1.patterns) {
            apply(
                Tier::Tier1,
                tier1.weight,
                format!("+{}: {} ({})", tier1.weight, tier1.description, pattern),
            );
        }
    }

    if let Some(tier2) = signals.tier2_strong.as_ref().filter(|_| has_design_role) {
        if let Some(pattern) = contains_any(&desc_lower, &tier2.patterns) {
            apply(
                Tier::Tier2,
                tier2.weight,
                format!("+{}: {} ({})", tier2.weight, tier2.description, pattern),
            );
        }
    }

    if let Some(tier3) = signals.tier3_cad_project.as_ref().filter(|_| has_design_role) {
        let has_cad = contains_any(&desc_lower, &tier3.patterns_cad).is_some();
        let has_project = contains_any(&desc_lower, &tier3.patterns_project).is_some();
        if has_cad && has_project {
            apply(
                Tier::Tier3,
                tier3.weight,
                format!("+{}: {}", tier3.weight, tier3.description),
            );
        }
    }

    if let Some(tier4) = &signals.tier4_title {
        if let Some(pattern) = contains_any(&title_window, &tier4.patterns) {
            apply(
                Tier::Tier4,
                tier4.weight,
                format!("+{}: {} ({})", tier4.weight, tier4.description, pattern),
            );
        }
    }

    if let Some(tier5) = signals.tier5_cad_design.as_ref().filter(|_| has_design_role) {
        if contains_any(&desc_lower, &tier5.patterns_cad).is_some() {
            apply(
                Tier::Tier5,
                tier5.weight,
                format!("+{}: {}", tier5.weight, tier5.description),
            );
        }
    }

    if let Some(tier6) = &signals.tier6_design_titles {
        if let Some(pattern) = contains_any(&desc_lower, &tier6.patterns) {
            apply(
                Tier::Tier6,
                tier6.weight,
                format!("+{}: {} ({})", tier6.weight, tier6.description, pattern),
            );
        }
    }

    if has_design_role {
        reasons.push("+0: Has design role indicator".to_string());
    }

    RoleScore {
        score,
        reasons,
        verdict: None,
        matched_tiers,
        context_location: Some(location),
    }
}

/// 返回第一个出现在 text 中的模式
fn contains_any<'p>(text: &str, patterns: &'p [String]) -> Option<&'p str> {
    patterns
        .iter()
        .find(|p| text.contains(p.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> RuleConfig {
        RuleConfig::from_value(json!({
            "threshold": 50.0,
            "company_blocklist": ["lockheed martin"],
            "required_context": {"patterns": ["solar", "photovoltaic"]},
            "exclusions": {
                "sales": {"description": "Sales role", "check_area": "title", "patterns": ["sales rep"]},
                "space": {"description": "Space role", "patterns": ["satellite"]}
            },
            "design_role_indicators": ["design", "drafter"],
            "positive_signals": {
                "tier1_tools": {"weight": 100, "description": "Solar tool", "patterns": ["pvsyst", "helioscope"]},
                "tier2_strong": {"weight": 50, "description": "Strong", "patterns": ["plan set"]},
                "tier3_cad_project": {"weight": 40, "description": "CAD project",
                    "patterns_cad": ["autocad"], "patterns_project": ["utility-scale"]},
                "tier4_title": {"weight": 30, "description": "Title", "patterns": ["designer"]},
                "tier5_cad_design": {"weight": 25, "description": "CAD design", "patterns_cad": ["autocad"]},
                "tier6_design_titles": {"weight": 20, "description": "Design title", "patterns": ["drafter"]}
            }
        }))
        .unwrap()
    }

    #[test]
    fn blocklisted_company_vetoes_even_with_every_tool() {
        let result = score_job(
            "solar designer using pvsyst helioscope autocad plan set",
            Some("Lockheed Martin Space"),
            None,
            &config(),
        );
        assert!(!result.qualified);
        assert_eq!(result.score, VETO_SCORE);
        assert_eq!(result.company_score, VETO_SCORE);
        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].contains("lockheed martin"));
        assert_eq!(
            result.verdict.rejection_category().as_deref(),
            Some("company_blocklist")
        );
    }

    #[test]
    fn empty_description_scores_zero() {
        let result = score_job("   ", Some("Acme"), None, &config());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.reasons, vec!["No description provided".to_string()]);
        assert_eq!(result.verdict, Verdict::NoDescription);
    }

    #[test]
    fn context_can_come_from_title_alone() {
        let result = score_job("CAD drafter with pvsyst", None, Some("Solar Drafter"), &config());
        assert_eq!(result.context_location, Some(ContextLocation::Title));
        assert!(result.reasons[0].contains("in title"));
        assert!(result.qualified);
    }

    #[test]
    fn missing_context_stops_before_exclusions() {
        let result = score_job("satellite antenna designer", None, None, &config());
        assert_eq!(result.verdict, Verdict::MissingContext);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn title_scoped_exclusion_ignores_text_past_window() {
        let padding = "x".repeat(TITLE_WINDOW_CHARS);
        let late = format!("solar design role using pvsyst {padding} works with a sales rep");
        assert!(score_job(&late, None, None, &config()).qualified);

        let early = "sales rep for solar design software pvsyst";
        let result = score_job(early, None, None, &config());
        assert!(!result.qualified);
        assert_eq!(result.score, VETO_SCORE);
        assert_eq!(
            result.verdict,
            Verdict::Excluded {
                category: "sales".to_string(),
                pattern: "sales rep".to_string()
            }
        );
        assert_eq!(result.reasons[0], "Excluded: Sales role (matched 'sales rep')");
    }

    #[test]
    fn exclusion_outranks_positive_signals() {
        let result = score_job(
            "solar satellite designer pvsyst helioscope",
            None,
            None,
            &config(),
        );
        assert!(!result.qualified);
        assert_eq!(result.role_score, VETO_SCORE);
        assert!(result.matched_tiers.is_empty());
    }

    #[test]
    fn tier_applies_once_even_with_many_matches() {
        let result = score_job("solar work in pvsyst and helioscope and pvsyst", None, None, &config());
        assert_eq!(result.score, 100.0);
        assert_eq!(result.matched_tiers, vec![Tier::Tier1]);
        assert_eq!(result.reasons[1], "+100: Solar tool (pvsyst)");
    }

    #[test]
    fn gated_tiers_need_design_role() {
        let without = score_job("solar autocad utility-scale plan set", None, None, &config());
        assert!(without.matched_tiers.is_empty());
        assert_eq!(without.verdict, Verdict::BelowThreshold);

        let with = score_job("solar design autocad utility-scale plan set", None, None, &config());
        assert_eq!(with.matched_tiers, vec![Tier::Tier2, Tier::Tier3, Tier::Tier5]);
        assert_eq!(with.score, 115.0);
        assert_eq!(with.reasons.last().map(String::as_str), Some("+0: Has design role indicator"));
    }

    #[test]
    fn title_tier_only_reads_opening_window() {
        let early = score_job("solar designer for rooftop arrays", None, None, &config());
        assert_eq!(early.matched_tiers, vec![Tier::Tier4]);
        assert_eq!(early.score, 30.0);
        assert_eq!(early.reasons[1], "+30: Title (designer)");

        let padding = "x".repeat(TITLE_WINDOW_CHARS);
        let late = format!("solar role {padding} reporting to the lead designer");
        let result = score_job(&late, None, None, &config());
        assert!(result.matched_tiers.is_empty());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn ungated_tiers_score_without_design_role() {
        let mut config = config();
        config.design_role_indicators = vec!["layout engineer".to_string()];

        let result = score_job("solar designer and drafter, pvsyst", None, None, &config);
        assert_eq!(result.matched_tiers, vec![Tier::Tier1, Tier::Tier4, Tier::Tier6]);
        assert_eq!(result.score, 150.0);
        assert!(!result.reasons.iter().any(|r| r.contains("design role indicator")));
    }

    #[test]
    fn qualified_matches_threshold_comparison() {
        let result = score_job("solar design autocad", None, None, &config());
        assert_eq!(result.score, 25.0);
        assert!(!result.qualified);
        assert_eq!(result.qualified, result.score >= result.threshold);
        assert_eq!(result.highest_tier(), Some(Tier::Tier5));
    }

    #[test]
    fn boolean_wrapper_agrees_with_detailed_result() {
        let config = config();
        for desc in [
            "solar pvsyst",
            "solar design autocad",
            "",
            "tennis",
            "solar satellite pvsyst",
        ] {
            assert_eq!(
                qualifies(desc, Some("Acme"), &config),
                score_job(desc, Some("Acme"), None, &config).qualified
            );
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let config = config();
        let desc = "solar designer with autocad on utility-scale plan set, pvsyst";
        assert_eq!(
            score_job(desc, Some("Acme"), None, &config),
            score_job(desc, Some("Acme"), None, &config)
        );
    }
}

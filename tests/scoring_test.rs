use std::path::PathBuf;

use chrono::NaiveDate;
use solar_leads::error::ConfigError;
use solar_leads::filter::{apply_filter, qualifies, score_job, RuleConfig, Tier, Verdict};
use solar_leads::models::{Posting, SearchTerm, SourceName};
use solar_leads::processing::build_leads;

fn rules_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/filter-config.json")
}

fn rules() -> RuleConfig {
    tokio_test::block_on(RuleConfig::load(&rules_path())).expect("规则配置应能加载")
}

fn posting(title: &str, company: &str, description: &str) -> Posting {
    Posting {
        title: title.to_string(),
        company: company.to_string(),
        location: "Phoenix, AZ".to_string(),
        description: description.to_string(),
        url: format!("https://jobs.example.com/{}", company.to_lowercase().replace(' ', "-")),
        source: SourceName::Indeed,
        search_term: SearchTerm::new("solar designer"),
    }
}

#[test]
fn solar_design_tool_qualifies() {
    let rules = rules();
    let description = "Electrical Design Technician using AutoCAD to design utility-scale solar energy systems, PVsyst experience preferred,";

    let result = score_job(description, Some("Acme Renewables"), None, &rules);

    assert!(result.qualified);
    assert_eq!(result.verdict, Verdict::Qualified);
    assert!(result.matched_tiers.contains(&Tier::Tier1));
    assert!(result.score >= rules.threshold);
    assert!(qualifies(description, Some("Acme Renewables"), &rules));
}

#[test]
fn blocklisted_company_is_vetoed() {
    let rules = rules();
    let description = "Solar design role using CAD for solar energy projects with PVsyst";

    let result = score_job(description, Some("Lockheed Martin Solar Division"), None, &rules);

    assert!(!result.qualified);
    assert_eq!(result.score, -100.0);
    assert!(result.reasons[0].contains("lockheed martin"));
    assert!(matches!(result.verdict, Verdict::CompanyBlocked { .. }));
}

#[test]
fn missing_solar_context_scores_zero() {
    let rules = rules();

    let result = score_job(
        "Tennis stringing technician, racquet restringing, no solar content",
        None,
        None,
        &rules,
    );

    assert!(!result.qualified);
    assert_eq!(result.score, 0.0);
    assert_eq!(result.verdict, Verdict::MissingContext);
    assert!(result.matched_tiers.is_empty());
}

#[test]
fn filtered_postings_become_one_lead_per_company() {
    let rules = rules();
    let strong = "Solar designer creating permit plan sets in AutoCAD for residential solar PV systems. Aurora Solar and HelioScope required.";
    let postings = vec![
        posting("Solar Designer", "Sunrun Inc.", strong),
        posting("PV Designer", "Sunrun", strong),
        posting(
            "Solar Installer",
            "Roof Co",
            "Solar installer for rooftop solar crews, AutoCAD a plus",
        ),
        posting("Solar Designer", "Lockheed Martin", strong),
        posting("Tennis Coach", "Club", "Teach tennis"),
    ];

    let outcome = apply_filter(postings, &rules);
    assert_eq!(outcome.stats.total_processed, 5);
    assert_eq!(outcome.qualified.len(), 2);
    assert_eq!(outcome.rejected.len(), 3);

    let leads = build_leads(&outcome.qualified, NaiveDate::from_ymd_opt(2026, 5, 4).unwrap());
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].domain, "sunrun.com");
    assert!(leads[0].confidence_score <= 100.0);
}

#[tokio::test]
async fn shipped_rules_load_in_file_order() {
    let rules = RuleConfig::load(&rules_path()).await.expect("规则配置应能加载");
    let names: Vec<&str> = rules.exclusions.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names[..2], ["installer", "sales"]);
    assert_eq!(names.last().copied(), Some("tennis"));
}

#[tokio::test]
async fn missing_rules_file_is_a_read_error() {
    let err = RuleConfig::load(&rules_path().with_file_name("absent.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed { .. }));
}

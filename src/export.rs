//! 导出模块
//!
//! 把一次运行的结果写入输出目录：
//! - `run_stats_<run>[_batch<N>].json`：运行统计 + 过滤统计
//! - `search_errors_<run>[_batch<N>].json`：搜索失败（有失败时才写）
//! - `deep_analytics_<run>[_batch<N>].json`：逐次尝试诊断
//! - `rejected_leads_<run>.json`：被拒样本，供人工复核
//! - `solar_leads_<run>[_batch<N>].csv`：线索表

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ExportError;
use crate::filter::{FilterStats, RejectedSample};
use crate::orchestrator::{DeepAnalytics, ErrorKind, ScrapeStats, SearchError};
use crate::processing::Lead;
use crate::utils::clip;

/// 被拒样本最多导出条数
pub const MAX_REJECTED_EXPORT: usize = 100;

/// 被拒样本描述最大字符数
pub const MAX_REJECTED_DESCRIPTION: usize = 2000;

/// 过滤统计里保留的拒绝原因数
const TOP_REJECTION_REASONS: usize = 10;

/// 会被表格软件当作公式的起始字符
const FORMULA_PREFIXES: &[char] = &['=', '+', '-', '@', '\t', '\r'];

/// 防止表格公式注入：以公式字符开头的单元格前加 `'`
pub fn sanitize_csv_cell(value: &str) -> String {
    if value.starts_with(FORMULA_PREFIXES) {
        format!("'{}", value)
    } else {
        value.to_string()
    }
}

/// 结果导出器
pub struct Exporter {
    output_dir: PathBuf,
    run_id: String,
    batch: Option<i64>,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>, run_id: impl Into<String>, batch: Option<i64>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_id: run_id.into(),
            batch,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<prefix>_<run>[_batch<N>].<ext>`
    pub fn batch_file(&self, prefix: &str, ext: &str) -> PathBuf {
        let name = match self.batch {
            Some(batch) => format!("{}_{}_batch{}.{}", prefix, self.run_id, batch, ext),
            None => format!("{}_{}.{}", prefix, self.run_id, ext),
        };
        self.output_dir.join(name)
    }

    fn ensure_dir(&self) -> Result<(), ExportError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::WriteFailed {
            path: self.output_dir.display().to_string(),
            source,
        })
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, data: &T) -> Result<(), ExportError> {
        self.ensure_dir()?;
        let content = serde_json::to_string_pretty(data).map_err(|source| ExportError::Serialize {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, content).map_err(|source| ExportError::WriteFailed {
            path: path.display().to_string(),
            source,
        })
    }

    // ========== JSON ==========

    /// 运行统计，附带过滤统计
    pub fn write_run_stats(
        &self,
        stats: &ScrapeStats,
        filter: &FilterStats,
    ) -> Result<PathBuf, ExportError> {
        let path = self.batch_file("run_stats", "json");
        let mut document = serde_json::to_value(stats).map_err(|source| ExportError::Serialize {
            path: path.display().to_string(),
            source,
        })?;

        let rejection_reasons: BTreeMap<&str, usize> = filter
            .top_rejections(TOP_REJECTION_REASONS)
            .into_iter()
            .collect();
        if let Value::Object(map) = &mut document {
            map.insert(
                "filter".to_string(),
                json!({
                    "total_processed": filter.total_processed,
                    "qualified": filter.total_qualified,
                    "rejected": filter.total_rejected,
                    "pass_rate": (filter.pass_rate() * 100.0).round() / 100.0,
                    "company_blocked": filter.company_blocked,
                    "rejection_reasons": rejection_reasons,
                    "qualification_tiers": filter.qualification_tiers,
                }),
            );
        }

        self.write_json(&path, &document)?;
        info!("📊 运行统计已导出: {}", path.display());
        Ok(path)
    }

    /// 搜索失败记录，没有失败时不写文件
    pub fn write_search_errors(&self, errors: &[SearchError]) -> Result<Option<PathBuf>, ExportError> {
        if errors.is_empty() {
            return Ok(None);
        }

        let mut summary: BTreeMap<ErrorKind, usize> = BTreeMap::new();
        for error in errors {
            *summary.entry(error.error_type).or_insert(0) += 1;
        }

        let path = self.batch_file("search_errors", "json");
        let document = json!({
            "metadata": {
                "created": Local::now(),
                "run_id": self.run_id,
                "batch": self.batch,
                "total_errors": errors.len(),
                "error_summary": summary,
            },
            "errors": errors,
        });

        self.write_json(&path, &document)?;
        info!("⚠️ 导出 {} 条搜索失败: {}", errors.len(), path.display());
        Ok(Some(path))
    }

    /// 深度诊断
    pub fn write_deep_analytics(&self, analytics: &DeepAnalytics) -> Result<PathBuf, ExportError> {
        let path = self.batch_file("deep_analytics", "json");
        self.write_json(&path, &analytics.document())?;
        info!("🔬 深度诊断已导出: {}", path.display());
        Ok(path)
    }

    /// 被拒样本，标注为 false 供人工复核漏判
    pub fn write_rejected_leads(&self, rejected: &[RejectedSample]) -> Result<PathBuf, ExportError> {
        let path = self
            .output_dir
            .join(format!("rejected_leads_{}.json", self.run_id));

        let items: Vec<Value> = rejected
            .iter()
            .take(MAX_REJECTED_EXPORT)
            .map(|sample| {
                json!({
                    "id": sample.id,
                    "description": clip(&sample.description, MAX_REJECTED_DESCRIPTION),
                    "label": false,
                    "company": sample.company,
                    "title": sample.title,
                    "notes": format!("Rejected: {} (score: {})", sample.rejection_reason, sample.score),
                })
            })
            .collect();

        let document = json!({
            "metadata": {
                "created": Local::now(),
                "purpose": "labeling_review",
                "run_id": self.run_id,
                "count": items.len(),
                "total_rejected": rejected.len(),
                "notes": "Review and change label to true for any false negatives",
            },
            "items": items,
        });

        self.write_json(&path, &document)?;
        info!("📝 导出 {} 条被拒样本: {}", rejected.len().min(MAX_REJECTED_EXPORT), path.display());
        Ok(path)
    }

    // ========== CSV ==========

    /// 线索表，所有文本单元格防公式注入
    pub fn write_leads_csv(&self, leads: &[Lead]) -> Result<PathBuf, ExportError> {
        self.ensure_dir()?;
        let path = self.batch_file("solar_leads", "csv");
        let csv_error = |source| ExportError::Csv {
            path: path.display().to_string(),
            source,
        };

        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        for lead in leads {
            writer.serialize(sanitized(lead)).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| ExportError::WriteFailed {
            path: path.display().to_string(),
            source,
        })?;

        info!("💾 导出 {} 条线索: {}", leads.len(), path.display());
        Ok(path)
    }
}

fn sanitized(lead: &Lead) -> Lead {
    Lead {
        company: sanitize_csv_cell(&lead.company),
        domain: sanitize_csv_cell(&lead.domain),
        job_title: sanitize_csv_cell(&lead.job_title),
        location: sanitize_csv_cell(&lead.location),
        confidence_score: lead.confidence_score,
        posting_url: sanitize_csv_cell(&lead.posting_url),
        linkedin_managers: sanitize_csv_cell(&lead.linkedin_managers),
        linkedin_hiring: sanitize_csv_cell(&lead.linkedin_hiring),
        linkedin_role: sanitize_csv_cell(&lead.linkedin_role),
        google_enduser: sanitize_csv_cell(&lead.google_enduser),
        date_scraped: sanitize_csv_cell(&lead.date_scraped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "solar_leads_export_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn formula_cells_are_escaped() {
        assert_eq!(sanitize_csv_cell("=HYPERLINK(\"x\")"), "'=HYPERLINK(\"x\")");
        assert_eq!(sanitize_csv_cell("+1 555"), "'+1 555");
        assert_eq!(sanitize_csv_cell("-Acme"), "'-Acme");
        assert_eq!(sanitize_csv_cell("@handle"), "'@handle");
        assert_eq!(sanitize_csv_cell("\tTabbed"), "'\tTabbed");
        assert_eq!(sanitize_csv_cell("Sunrun"), "Sunrun");
        assert_eq!(sanitize_csv_cell(""), "");
    }

    #[test]
    fn file_names_carry_batch_suffix() {
        let batched = Exporter::new("out", "20260301_120000", Some(2));
        assert_eq!(
            batched.batch_file("run_stats", "json"),
            PathBuf::from("out/run_stats_20260301_120000_batch2.json")
        );
        let whole = Exporter::new("out", "20260301_120000", None);
        assert_eq!(
            whole.batch_file("solar_leads", "csv"),
            PathBuf::from("out/solar_leads_20260301_120000.csv")
        );
    }

    #[test]
    fn no_errors_means_no_file() {
        let dir = scratch_dir("no_errors");
        let exporter = Exporter::new(&dir, "run", None);
        assert_eq!(exporter.write_search_errors(&[]).unwrap(), None);
        assert!(!dir.exists());
    }

    #[test]
    fn rejected_export_is_capped_and_labeled() {
        let dir = scratch_dir("rejected");
        let exporter = Exporter::new(&dir, "run", Some(0));
        let samples: Vec<RejectedSample> = (1..=120)
            .map(|n| RejectedSample {
                id: format!("rejected_{n:03}_Acme"),
                description: "d".repeat(3000),
                company: "Acme".into(),
                title: "Installer".into(),
                rejection_reason: "exclusions.installer".into(),
                score: -100.0,
            })
            .collect();

        let path = exporter.write_rejected_leads(&samples).unwrap();
        assert!(path.ends_with("rejected_leads_run.json"));

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["metadata"]["count"], 100);
        assert_eq!(doc["metadata"]["total_rejected"], 120);
        assert_eq!(doc["metadata"]["purpose"], "labeling_review");
        let first = &doc["items"][0];
        assert_eq!(first["label"], false);
        assert_eq!(first["description"].as_str().unwrap().len(), MAX_REJECTED_DESCRIPTION);
        assert_eq!(first["notes"], "Rejected: exclusions.installer (score: -100)");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn leads_csv_has_header_and_escaped_cells() {
        let dir = scratch_dir("csv");
        let exporter = Exporter::new(&dir, "run", None);
        let lead = Lead {
            company: "=cmd".into(),
            domain: "cmd.com".into(),
            job_title: "PV Designer".into(),
            location: "Remote".into(),
            confidence_score: 100.0,
            posting_url: "https://jobs.example.com/1".into(),
            linkedin_managers: String::new(),
            linkedin_hiring: String::new(),
            linkedin_role: String::new(),
            google_enduser: String::new(),
            date_scraped: "2026-03-01".into(),
        };

        let path = exporter.write_leads_csv(&[lead]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "company,domain,job_title,location,confidence_score,posting_url,linkedin_managers,linkedin_hiring,linkedin_role,google_enduser,date_scraped"
        );
        assert!(lines.next().unwrap().starts_with("'=cmd,cmd.com,PV Designer,Remote,100.0,"));

        let _ = fs::remove_dir_all(&dir);
    }
}

// certmig-core/src/domain/validate/report.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "ERROR", alias = "error")]
    Error,
    #[serde(rename = "WARNING", alias = "warning")]
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "PASSED_WITH_WARNINGS")]
    PassedWithWarnings,
    #[serde(rename = "FAILED")]
    Failed,
}

/// One reported problem, shaped for the JSON report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_orphaned: Option<Vec<serde_json::Value>>,
}

impl Finding {
    pub fn new(check: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            severity,
            message: message.into(),
            table: None,
            column: None,
            rule: None,
            referenced_table: None,
            sample_orphaned: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

/// Per-family counters plus the findings the family produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyResult {
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl FamilyResult {
    pub fn pass(&mut self) {
        self.checks_run += 1;
        self.checks_passed += 1;
    }

    pub fn fail(&mut self, finding: Finding) {
        self.checks_run += 1;
        self.checks_failed += 1;
        self.errors.push(finding);
    }

    /// A warning still counts the check as passed.
    pub fn warn(&mut self, finding: Finding) {
        self.checks_run += 1;
        self.checks_passed += 1;
        self.warnings.push(finding);
    }

    /// Routes by declared severity.
    pub fn report(&mut self, severity: Severity, finding: Finding) {
        match severity {
            Severity::Error => self.fail(finding),
            Severity::Warning => self.warn(finding),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_timestamp: String,
    pub data_dir: String,
    pub overall_status: OverallStatus,
    pub checks: BTreeMap<String, FamilyResult>,
    pub total_checks: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_warnings: usize,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub success: bool,
    pub duration_seconds: f64,
}

impl ValidationReport {
    /// Folds the family results into the aggregate and derives the
    /// overall status: FAILED on any error, PASSED_WITH_WARNINGS on any
    /// warning, PASSED otherwise.
    pub fn aggregate(
        data_dir: &str,
        families: Vec<(&'static str, FamilyResult)>,
        duration_seconds: f64,
    ) -> Self {
        let mut report = Self {
            run_timestamp: chrono::Utc::now().to_rfc3339(),
            data_dir: data_dir.to_string(),
            overall_status: OverallStatus::Passed,
            checks: BTreeMap::new(),
            total_checks: 0,
            total_passed: 0,
            total_failed: 0,
            total_warnings: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            success: true,
            duration_seconds,
        };

        for (name, family) in families {
            report.total_checks += family.checks_run;
            report.total_passed += family.checks_passed;
            report.total_failed += family.checks_failed;
            report.errors.extend(family.errors.iter().cloned());
            report.warnings.extend(family.warnings.iter().cloned());
            report.checks.insert(name.to_string(), family);
        }

        report.total_warnings = report.warnings.len();
        report.overall_status = if report.total_failed > 0 {
            report.success = false;
            OverallStatus::Failed
        } else if report.total_warnings > 0 {
            OverallStatus::PassedWithWarnings
        } else {
            OverallStatus::Passed
        };

        report
    }
}

use crate::{
    core::{
        issue::{Severity, ValidationIssue},
        value::ValueMap,
    },
    execution::result::ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final, deduplicated report for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub overall_status: bool,
    pub total_issues: usize,
    pub issues_by_severity: BTreeMap<Severity, usize>,
    pub issues_by_checker: BTreeMap<String, usize>,
    pub consolidated_issues: Vec<ValidationIssue>,
    /// Raw inputs, kept for traceability.
    pub checker_results: Vec<ValidationResult>,
    pub summary_statistics: ValueMap,
    pub quality_scores: BTreeMap<String, f64>,
    pub recommendations: Vec<String>,
}

impl AggregatedResult {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues_by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn critical_count(&self) -> usize {
        self.count(Severity::Critical)
    }

    pub fn quality_score(&self, name: &str) -> Option<f64> {
        self.quality_scores.get(name).copied()
    }

    /// `total_issues` matches the consolidated list and the severity counts add up.
    pub fn is_consistent(&self) -> bool {
        self.total_issues == self.consolidated_issues.len()
            && self.issues_by_severity.values().sum::<usize>() == self.total_issues
    }
}

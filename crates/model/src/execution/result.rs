use crate::core::{
    identifiers::{SessionId, new_id},
    issue::{Severity, ValidationIssue},
    value::ValueMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ResultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultStatus::Completed | ResultStatus::Failed | ResultStatus::Cancelled
        )
    }
}

/// Output of one checker invocation, or of one chunk of a streamed invocation.
///
/// `is_valid` and `issues` are only reachable through methods so that a valid
/// result can never carry a critical issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub checker_name: String,
    pub result_id: String,
    pub session_id: SessionId,
    pub status: ResultStatus,
    is_valid: bool,
    issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub summary: ValueMap,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ValidationResult {
    pub fn new(checker_name: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            checker_name: checker_name.into(),
            result_id: new_id("res"),
            session_id,
            status: ResultStatus::Pending,
            is_valid: true,
            issues: Vec::new(),
            summary: ValueMap::new(),
            metrics: BTreeMap::new(),
            execution_time_ms: 0,
            completed_at: None,
        }
    }

    /// Failed result carrying a single issue.
    pub fn failed(
        checker_name: impl Into<String>,
        session_id: SessionId,
        issue: ValidationIssue,
    ) -> Self {
        let mut result = Self::new(checker_name, session_id);
        result.push_issue(issue);
        result.is_valid = false;
        result.finish(ResultStatus::Failed);
        result
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Sets validity. A result holding a critical issue stays invalid.
    pub fn set_valid(&mut self, valid: bool) {
        self.is_valid = valid && !self.has_critical();
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn push_issue(&mut self, issue: ValidationIssue) {
        if issue.is_critical() {
            self.is_valid = false;
        }
        self.issues.push(issue);
    }

    pub fn extend_issues(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for issue in issues {
            self.push_issue(issue);
        }
    }

    /// Mutable access to issue fields that cannot affect validity.
    pub fn for_each_issue_mut(&mut self, mut f: impl FnMut(&mut IssueView<'_>)) {
        for issue in &mut self.issues {
            f(&mut IssueView(issue));
        }
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_critical)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_summary(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.summary.insert(key.into(), value.into());
        self
    }

    /// Moves the result into a terminal status and stamps the completion time.
    pub fn finish(&mut self, status: ResultStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// Restricted view over an issue owned by a result. Severity is read-only so
/// the validity invariant cannot be bypassed.
pub struct IssueView<'a>(&'a mut ValidationIssue);

impl IssueView<'_> {
    pub fn issue(&self) -> &ValidationIssue {
        self.0
    }

    pub fn set_checker_name(&mut self, checker_name: &str) {
        self.0.checker_name = checker_name.to_string();
    }

    pub fn insert_detail(&mut self, key: &str, value: serde_json::Value) {
        self.0.details.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::new("ses-test")
    }

    #[test]
    fn test_new_result_is_pending_and_valid() {
        let result = ValidationResult::new("schema", session());
        assert_eq!(result.status, ResultStatus::Pending);
        assert!(result.is_valid());
        assert!(result.issues().is_empty());
        assert!(result.result_id.starts_with("res-"));
    }

    #[test]
    fn test_critical_issue_invalidates() {
        let mut result = ValidationResult::new("schema", session());
        result.push_issue(ValidationIssue::warning("w", "warn", "a"));
        assert!(result.is_valid());

        result.push_issue(ValidationIssue::critical("c", "crit", "a"));
        assert!(!result.is_valid());

        result.set_valid(true);
        assert!(!result.is_valid(), "critical issue must keep result invalid");
    }

    #[test]
    fn test_checker_may_mark_invalid_without_critical() {
        let mut result = ValidationResult::new("schema", session());
        result.push_issue(ValidationIssue::warning("w", "warn", "a"));
        result.set_valid(false);
        assert!(!result.is_valid());
        result.set_valid(true);
        assert!(result.is_valid());
    }

    #[test]
    fn test_failed_constructor() {
        let result = ValidationResult::failed(
            "slow_checker",
            session(),
            ValidationIssue::critical("timeout", "timed out", "checker.slow_checker"),
        );
        assert_eq!(result.status, ResultStatus::Failed);
        assert!(!result.is_valid());
        assert_eq!(result.count(Severity::Critical), 1);
        assert!(result.completed_at.is_some());
    }

    #[test]
    fn test_issue_view_updates_checker_name() {
        let mut result = ValidationResult::new("units", session());
        result.push_issue(ValidationIssue::info("note", "n", "a"));
        result.for_each_issue_mut(|view| {
            if view.issue().checker_name.is_empty() {
                view.set_checker_name("units");
            }
        });
        assert_eq!(result.issues()[0].checker_name, "units");
    }
}

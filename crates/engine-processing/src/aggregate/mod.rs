pub mod similarity;

use engine_config::AggregationSettings;
use model::{AggregatedResult, ResultStatus, Severity, ValidationIssue, ValidationResult, ValueMap};
use serde_json::{Value, json};
use similarity::{jaccard, location_segments, message_words};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
};
use tracing::debug;

/// Aggregates with the default thresholds and weights.
pub fn aggregate(results: &[ValidationResult]) -> AggregatedResult {
    ResultsAggregator::default().aggregate(results)
}

/// Merges the results of one run into a single deduplicated report.
///
/// The output depends only on the input list: grouping is first-fit in input
/// order and sorting is stable, so aggregating the same results twice gives
/// identical reports.
#[derive(Debug, Clone, Default)]
pub struct ResultsAggregator {
    settings: AggregationSettings,
}

/// Similarity keys of one issue, derived once per consolidation.
struct Keys {
    segments: BTreeSet<String>,
    words: BTreeSet<String>,
}

impl Keys {
    fn of(issue: &ValidationIssue) -> Self {
        Self {
            segments: location_segments(&issue.location),
            words: message_words(&issue.message),
        }
    }
}

struct Group<'a> {
    members: Vec<&'a ValidationIssue>,
    keys: Keys,
}

impl<'a> Group<'a> {
    fn new(issue: &'a ValidationIssue, keys: Keys) -> Self {
        Self {
            members: vec![issue],
            keys,
        }
    }

    fn head(&self) -> &'a ValidationIssue {
        self.members[0]
    }

    /// Compares against the head only.
    fn accepts(&self, issue: &ValidationIssue, keys: &Keys, threshold: f64) -> bool {
        let head = self.head();
        head.check_name == issue.check_name
            && head.severity == issue.severity
            && jaccard(&self.keys.segments, &keys.segments) >= threshold
            && jaccard(&self.keys.words, &keys.words) >= threshold
    }

    fn merge(&self) -> ValidationIssue {
        let mut merged = self.head().clone();
        if self.members.len() == 1 {
            return merged;
        }

        let mut locations: Vec<&str> = Vec::new();
        let mut checkers: Vec<&str> = Vec::new();
        for issue in &self.members {
            if !locations.contains(&issue.location.as_str()) {
                locations.push(&issue.location);
            }
            if !issue.checker_name.is_empty() && !checkers.contains(&issue.checker_name.as_str()) {
                checkers.push(&issue.checker_name);
            }
        }

        let total: u32 = self
            .members
            .iter()
            .fold(0u32, |acc, i| acc.saturating_add(i.occurrence_count()));

        merged.location = locations.join(", ");
        merged.checker_name = checkers.join(", ");
        merged.details.insert("locations".into(), json!(locations));
        merged.details.insert("checkers".into(), json!(checkers));
        merged.add_occurrences(total.saturating_sub(merged.occurrence_count()));
        merged
    }
}

impl ResultsAggregator {
    pub fn new(settings: AggregationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    pub fn aggregate(&self, results: &[ValidationResult]) -> AggregatedResult {
        let raw: Vec<&ValidationIssue> = results.iter().flat_map(|r| r.issues()).collect();
        let consolidated = self.consolidate(&raw);

        let mut issues_by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for issue in &consolidated {
            *issues_by_severity.entry(issue.severity).or_default() += 1;
        }

        let mut issues_by_checker: BTreeMap<String, usize> = BTreeMap::new();
        for result in results {
            *issues_by_checker.entry(result.checker_name.clone()).or_default() += result.issues().len();
        }

        let overall_status =
            results.iter().all(|r| r.is_valid()) && !consolidated.iter().any(|i| i.is_critical());

        let quality_scores = self.quality_scores(results, &issues_by_severity, consolidated.len());
        let recommendations = self.recommendations(results, &consolidated);
        let summary_statistics = summary_statistics(results, raw.len(), &consolidated);

        debug!(
            results = results.len(),
            raw_issues = raw.len(),
            consolidated = consolidated.len(),
            overall_status,
            "Aggregated results"
        );

        AggregatedResult {
            overall_status,
            total_issues: consolidated.len(),
            issues_by_severity,
            issues_by_checker,
            consolidated_issues: consolidated,
            checker_results: results.to_vec(),
            summary_statistics,
            quality_scores,
            recommendations,
        }
    }

    /// Groups similar issues, merges each group and sorts by severity, then
    /// by descending occurrence count.
    pub fn consolidate(&self, issues: &[&ValidationIssue]) -> Vec<ValidationIssue> {
        let threshold = self.settings.similarity_threshold;
        let mut groups: Vec<Group<'_>> = Vec::new();

        for &issue in issues {
            let keys = Keys::of(issue);
            match groups.iter_mut().find(|g| g.accepts(issue, &keys, threshold)) {
                Some(group) => group.members.push(issue),
                None => groups.push(Group::new(issue, keys)),
            }
        }

        let mut merged: Vec<ValidationIssue> = groups.iter().map(Group::merge).collect();
        merged.sort_by_key(|i| (i.severity.rank(), Reverse(i.occurrence_count())));
        merged
    }

    fn quality_scores(
        &self,
        results: &[ValidationResult],
        by_severity: &BTreeMap<Severity, usize>,
        total: usize,
    ) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();

        let overall = if total == 0 {
            1.0
        } else {
            let critical = by_severity.get(&Severity::Critical).copied().unwrap_or(0) as f64;
            let warning = by_severity.get(&Severity::Warning).copied().unwrap_or(0) as f64;
            1.0 - self.settings.critical_weight * critical / total as f64
                - self.settings.warning_weight * warning / total as f64
        };
        scores.insert("overall".to_string(), overall.clamp(0.0, 1.0));

        let success_rate = if results.is_empty() {
            1.0
        } else {
            results.iter().filter(|r| r.is_valid()).count() as f64 / results.len() as f64
        };
        scores.insert("checker_success_rate".to_string(), success_rate);

        let compliance: Vec<f64> = results
            .iter()
            .filter_map(|r| r.metrics.get("compliance_score").copied())
            .collect();
        if !compliance.is_empty() {
            scores.insert(
                "mean_compliance_score".to_string(),
                compliance.iter().sum::<f64>() / compliance.len() as f64,
            );
        }

        scores
    }

    fn recommendations(
        &self,
        results: &[ValidationResult],
        consolidated: &[ValidationIssue],
    ) -> Vec<String> {
        let mut out = Vec::new();

        for issue in consolidated.iter().filter(|i| i.is_critical()) {
            let n = issue.occurrence_count();
            let noun = if n == 1 { "issue" } else { "issues" };
            out.push(format!(
                "Address {n} critical {noun} from '{}' at {} before proceeding",
                issue.check_name, issue.location
            ));
        }

        let mut frequent: Vec<(&str, u32)> = Vec::new();
        for issue in consolidated.iter().filter(|i| i.occurrence_count() > 1) {
            match frequent.iter_mut().find(|(name, _)| *name == issue.check_name) {
                Some((_, count)) => *count = count.saturating_add(issue.occurrence_count()),
                None => frequent.push((issue.check_name.as_str(), issue.occurrence_count())),
            }
        }
        for (name, count) in frequent {
            out.push(format!(
                "Check '{name}' was reported {count} times; look for a common root cause"
            ));
        }

        let threshold = self.settings.slow_checker_threshold_ms;
        let mut slow: Vec<(&str, u64)> = Vec::new();
        for result in results.iter().filter(|r| r.execution_time_ms > threshold) {
            match slow.iter_mut().find(|(name, _)| *name == result.checker_name) {
                Some((_, ms)) => *ms = (*ms).max(result.execution_time_ms),
                None => slow.push((result.checker_name.as_str(), result.execution_time_ms)),
            }
        }
        for (name, ms) in slow {
            out.push(format!(
                "Checker '{name}' took {ms} ms (threshold {threshold} ms); consider streaming or tuning it"
            ));
        }

        out
    }
}

fn summary_statistics(
    results: &[ValidationResult],
    raw_issues: usize,
    consolidated: &[ValidationIssue],
) -> ValueMap {
    let valid = results.iter().filter(|r| r.is_valid()).count();
    let failed = results
        .iter()
        .filter(|r| r.status == ResultStatus::Failed)
        .count();
    let cancelled = results
        .iter()
        .filter(|r| r.status == ResultStatus::Cancelled)
        .count();
    let merged = consolidated.iter().filter(|i| i.occurrence_count() > 1).count();
    let total_time: u64 = results.iter().map(|r| r.execution_time_ms).sum();
    let max_time = results.iter().map(|r| r.execution_time_ms).max().unwrap_or(0);
    let checkers: BTreeSet<&str> = results.iter().map(|r| r.checker_name.as_str()).collect();

    let mut stats = ValueMap::new();
    stats.insert("total_results".into(), Value::from(results.len()));
    stats.insert("valid_results".into(), Value::from(valid));
    stats.insert("invalid_results".into(), Value::from(results.len() - valid));
    stats.insert("failed_results".into(), Value::from(failed));
    stats.insert("cancelled_results".into(), Value::from(cancelled));
    stats.insert("distinct_checkers".into(), Value::from(checkers.len()));
    stats.insert("raw_issue_count".into(), Value::from(raw_issues));
    stats.insert("consolidated_issue_count".into(), Value::from(consolidated.len()));
    stats.insert("merged_issue_count".into(), Value::from(merged));
    stats.insert("total_execution_time_ms".into(), Value::from(total_time));
    stats.insert("max_execution_time_ms".into(), Value::from(max_time));
    stats
}

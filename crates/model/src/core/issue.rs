use crate::core::{identifiers::new_id, value::ValueMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Severity of a finding. Variants are declared in rank order, so the derived
/// `Ord` puts `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    BestPractice,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Warning,
        Severity::Info,
        Severity::BestPractice,
    ];

    /// Sort rank, lower surfaces first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
            Severity::BestPractice => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::BestPractice => "best_practice",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown severity: {0}")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "best_practice" | "best-practice" => Ok(Severity::BestPractice),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

/// One finding reported by a checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    /// Dotted path into the validated subject, e.g. `data.channel1.unit`.
    pub location: String,
    pub check_name: String,
    pub checker_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default)]
    pub details: ValueMap,
    pub timestamp: DateTime<Utc>,
    occurrence_count: u32,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        check_name: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id("iss"),
            severity,
            message: message.into(),
            location: location.into(),
            check_name: check_name.into(),
            checker_name: String::new(),
            object_type: None,
            object_name: None,
            remediation: None,
            details: ValueMap::new(),
            timestamp: Utc::now(),
            occurrence_count: 1,
        }
    }

    pub fn critical(
        check_name: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Critical, check_name, message, location)
    }

    pub fn warning(
        check_name: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, check_name, message, location)
    }

    pub fn info(
        check_name: impl Into<String>,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Info, check_name, message, location)
    }

    pub fn with_checker(mut self, checker_name: impl Into<String>) -> Self {
        self.checker_name = checker_name.into();
        self
    }

    pub fn with_object(mut self, object_type: impl Into<String>, object_name: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self.object_name = Some(object_name.into());
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    /// How many raw findings this issue stands for. Always at least one.
    pub fn occurrence_count(&self) -> u32 {
        self.occurrence_count
    }

    /// Folds `additional` merged occurrences into this issue. The count never
    /// decreases.
    pub fn add_occurrences(&mut self, additional: u32) {
        self.occurrence_count = self.occurrence_count.saturating_add(additional);
    }
}

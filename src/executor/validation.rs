//! Validation rules checked before an operation runs.

use async_trait::async_trait;
use serde::Serialize;

/// One problem found by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a rule.
///
/// `success` is the verdict. Pushing an issue clears it, and a rule can also
/// fail without naming any issue via [`ValidationReport::failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    success: bool,
    issues: Vec<ValidationIssue>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            success: true,
            issues: Vec::new(),
        }
    }
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            issues: Vec::new(),
        }
    }

    pub fn with_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            success: issues.is_empty(),
            issues,
        }
    }

    pub fn push(
        &mut self,
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.success = false;
        self.issues.push(ValidationIssue::new(field, code, message));
        self
    }

    /// Folds `other` into this report; the result fails if either did.
    pub fn merge(&mut self, other: ValidationReport) -> &mut Self {
        self.success &= other.success;
        self.issues.extend(other.issues);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.success
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }
}

// == Validation Rule ==
/// A check run before the unit of work. Rules see whatever input they were
/// constructed with; the executor only asks them for a report.
#[async_trait]
pub trait ValidationRule: Send + Sync {
    async fn validate(&self) -> ValidationReport;
}

/// Adapts a synchronous closure into a rule.
pub struct FnRule<F>(F);

impl<F> FnRule<F>
where
    F: Fn() -> ValidationReport + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self(check)
    }
}

#[async_trait]
impl<F> ValidationRule for FnRule<F>
where
    F: Fn() -> ValidationReport + Send + Sync,
{
    async fn validate(&self) -> ValidationReport {
        (self.0)()
    }
}

/// Checks a required string field against length bounds, reporting
/// `REQUIRED`, `MIN_LENGTH` or `MAX_LENGTH`.
#[derive(Debug, Clone)]
pub struct LengthRule {
    field: String,
    value: Option<String>,
    min: usize,
    max: usize,
}

impl LengthRule {
    pub fn new(field: impl Into<String>, value: Option<String>, min: usize, max: usize) -> Self {
        Self {
            field: field.into(),
            value,
            min,
            max,
        }
    }
}

#[async_trait]
impl ValidationRule for LengthRule {
    async fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::valid();
        match self.value.as_deref() {
            None | Some("") => {
                report.push(&self.field, "REQUIRED", format!("{} is required", self.field));
            }
            Some(value) if value.chars().count() < self.min => {
                report.push(
                    &self.field,
                    "MIN_LENGTH",
                    format!("{} must be at least {} characters long", self.field, self.min),
                );
            }
            Some(value) if value.chars().count() > self.max => {
                report.push(
                    &self.field,
                    "MAX_LENGTH",
                    format!("{} must not exceed {} characters", self.field, self.max),
                );
            }
            Some(_) => {}
        }
        report
    }
}

use std::fmt::Write;

use crate::MetricData;

/// Metric types accepted by the [`StandardSchema`].
const VALID_MTYPES: &[&str] = &["gauge", "rate", "count", "counter", "timestamp"];

/// The reason a record was rejected.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The record has no organization.
    #[error("org-id cannot be 0")]
    OrgIdZero,
    /// The record has no resolution.
    #[error("interval cannot be 0")]
    IntervalZero,
    /// The record has no name.
    #[error("empty name")]
    EmptyName,
    /// The record has no publish-facing name.
    #[error("empty metric")]
    EmptyMetric,
    /// The metric type is not known.
    #[error("invalid mtype")]
    InvalidMtype,
    /// A rule specific to another schema was violated.
    #[error("{0}")]
    Other(String),
}

/// Validation and identity rules applied to ingested records.
pub trait MetricSchema: Send + Sync {
    /// Checks a normalized record, returning the first violated rule.
    fn validate(&self, metric: &MetricData) -> Result<(), ValidationError>;

    /// Computes the identity of the series the record belongs to.
    fn compute_id(&self, metric: &MetricData) -> String;
}

/// The rules of the raintank metrics schema.
///
/// The identity is `<org_id>.<md5>`, where the digest covers the publish-facing name, unit,
/// mtype, interval and the sorted tags, separated by NUL bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardSchema;

impl MetricSchema for StandardSchema {
    fn validate(&self, metric: &MetricData) -> Result<(), ValidationError> {
        if metric.org_id == 0 {
            return Err(ValidationError::OrgIdZero);
        }
        if metric.interval == 0 {
            return Err(ValidationError::IntervalZero);
        }
        if metric.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if metric.metric.is_empty() {
            return Err(ValidationError::EmptyMetric);
        }
        if !VALID_MTYPES.contains(&metric.mtype.as_str()) {
            return Err(ValidationError::InvalidMtype);
        }
        Ok(())
    }

    fn compute_id(&self, metric: &MetricData) -> String {
        let mut tags: Vec<&str> = metric.tags.iter().map(String::as_str).collect();
        tags.sort_unstable();

        let mut buffer = String::new();
        buffer.push_str(&metric.metric);
        buffer.push('\0');
        buffer.push_str(&metric.unit);
        buffer.push('\0');
        buffer.push_str(&metric.mtype);
        buffer.push('\0');
        write!(buffer, "{}", metric.interval).ok();
        for tag in tags {
            buffer.push('\0');
            buffer.push_str(tag);
        }

        format!("{}.{:x}", metric.org_id, md5::compute(buffer.as_bytes()))
    }
}

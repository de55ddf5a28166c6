//! Normalization of submitted metric batches.

use tsgw_auth::{Identity, NO_ORG};
use tsgw_schema::{DEFAULT_MTYPE, MetricData, MetricSchema, ValidationError};
use tsgw_statsd::metric;

use crate::statsd::GatewayCounters;

/// Normalizes, validates and identifies a batch on behalf of `identity`.
///
/// Records of non-admins are forced into the caller's organization. Records submitted by an
/// admin for [`NO_ORG`] are duplicated into `public_org` if one is configured. The duplicates are
/// appended after all submitted records.
///
/// The batch is rejected as a whole on the first invalid record.
pub fn normalize_batch(
    schema: &dyn MetricSchema,
    identity: Identity,
    public_org: Option<i64>,
    mut metrics: Vec<MetricData>,
) -> Result<Vec<MetricData>, ValidationError> {
    let submitted = metrics.len();
    let mut duplicates = Vec::new();

    for metric in &mut metrics {
        metric.metric.clone_from(&metric.name);
        if metric.mtype.is_empty() {
            metric.mtype = DEFAULT_MTYPE.to_owned();
        }
        metric.tags.clear();

        if !identity.is_admin {
            metric.org_id = identity.org_id;
        }

        if let Err(error) = schema.validate(metric) {
            tsgw_log::debug!(org_id = identity.org_id, "rejecting batch: {error}");
            metric!(counter(GatewayCounters::MetricsRejected) += submitted as i64);
            return Err(error);
        }

        metric.id = schema.compute_id(metric);

        match public_org {
            Some(public_org) if identity.is_admin && metric.org_id == NO_ORG => {
                duplicates.push(MetricData {
                    org_id: public_org,
                    ..metric.clone()
                });
            }
            _ => {}
        }
    }

    for duplicate in &mut duplicates {
        duplicate.id = schema.compute_id(duplicate);
    }
    metrics.append(&mut duplicates);

    metric!(counter(GatewayCounters::MetricsValid) += metrics.len() as i64);
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use tsgw_schema::StandardSchema;
    use tsgw_statsd::with_capturing_test_client;

    use super::*;

    fn record(name: &str, org_id: i64) -> MetricData {
        MetricData {
            name: name.to_owned(),
            org_id,
            interval: 10,
            value: 1.0,
            time: 1_700_000_000,
            tags: vec!["stale:tag".to_owned()],
            ..MetricData::default()
        }
    }

    #[test]
    fn test_non_admin_org_is_forced() {
        let identity = Identity::new(7, false);
        let batch = vec![record("a", 1), record("b", NO_ORG), record("c", 0)];

        let normalized = normalize_batch(&StandardSchema, identity, Some(99), batch).unwrap();

        assert_eq!(normalized.len(), 3);
        for metric in &normalized {
            assert_eq!(metric.org_id, 7);
            assert_eq!(metric.metric, metric.name);
            assert_eq!(metric.mtype, "gauge");
            assert!(metric.tags.is_empty());
            assert!(metric.id.starts_with("7."));
        }
    }

    #[test]
    fn test_admin_keeps_submitted_org() {
        let identity = Identity::new(1, true);
        let batch = vec![record("a", 42)];

        let normalized = normalize_batch(&StandardSchema, identity, Some(99), batch).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].org_id, 42);
    }

    #[test]
    fn test_admin_public_duplicate() {
        let identity = Identity::new(1, true);
        let batch = vec![record("a", NO_ORG), record("b", 5)];

        let normalized = normalize_batch(&StandardSchema, identity, Some(99), batch).unwrap();

        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[0].org_id, NO_ORG);
        assert_eq!(normalized[1].org_id, 5);

        let duplicate = &normalized[2];
        assert_eq!(duplicate.org_id, 99);
        assert_eq!(duplicate.name, "a");
        assert!(duplicate.id.starts_with("99."));
        assert_ne!(duplicate.id, normalized[0].id);
        assert_eq!(
            duplicate.id.split_once('.').map(|(_, hash)| hash),
            normalized[0].id.split_once('.').map(|(_, hash)| hash),
        );
    }

    #[test]
    fn test_no_duplicate_without_public_org() {
        let identity = Identity::new(1, true);
        let normalized =
            normalize_batch(&StandardSchema, identity, None, vec![record("a", NO_ORG)]).unwrap();
        assert_eq!(normalized.len(), 1);
    }

    #[test]
    fn test_non_admin_never_duplicates() {
        let identity = Identity::new(NO_ORG, false);
        let normalized =
            normalize_batch(&StandardSchema, identity, Some(99), vec![record("a", NO_ORG)])
                .unwrap();
        assert_eq!(normalized.len(), 1);
    }

    #[test]
    fn test_invalid_record_rejects_batch() {
        let identity = Identity::new(7, false);
        let mut invalid = record("b", 7);
        invalid.interval = 0;
        let batch = vec![record("a", 7), invalid, record("c", 7)];

        let mut result = None;
        let captures = with_capturing_test_client(|| {
            result = Some(normalize_batch(&StandardSchema, identity, None, batch));
        });

        assert_eq!(result, Some(Err(ValidationError::IntervalZero)));
        assert_eq!(captures, ["metrics.http.rejected:3|c"]);
    }

    #[test]
    fn test_valid_counter_includes_duplicates() {
        let identity = Identity::new(1, true);
        let batch = vec![record("a", NO_ORG), record("b", NO_ORG)];

        let captures = with_capturing_test_client(|| {
            normalize_batch(&StandardSchema, identity, Some(99), batch).unwrap();
        });
        assert_eq!(captures, ["metrics.http.valid:4|c"]);
    }

    #[test]
    fn test_empty_batch() {
        let identity = Identity::new(7, false);
        let captures = with_capturing_test_client(|| {
            let normalized = normalize_batch(&StandardSchema, identity, None, vec![]).unwrap();
            assert!(normalized.is_empty());
        });
        assert!(captures.is_empty());
    }
}

use serde::{Deserialize, Deserializer, Serialize};

/// The metric type assumed when a record does not carry one.
pub const DEFAULT_MTYPE: &str = "gauge";

/// A single data point of a time series.
///
/// JSON uses snake_case field names. MessagePack payloads produced by older clients use
/// capitalized names (`OrgId`, `Mtype`, ...), which are accepted as aliases.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricData {
    /// Series identity, see [`MetricSchema::compute_id`](crate::MetricSchema::compute_id).
    #[serde(default, alias = "Id", deserialize_with = "null_as_default")]
    pub id: String,
    /// The owning organization.
    #[serde(default, alias = "OrgId", deserialize_with = "null_as_default")]
    pub org_id: i64,
    /// The name as submitted.
    #[serde(default, alias = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    /// The name the series is published under.
    #[serde(default, alias = "Metric", deserialize_with = "null_as_default")]
    pub metric: String,
    /// Resolution of the series in seconds.
    #[serde(default, alias = "Interval", deserialize_with = "null_as_default")]
    pub interval: i64,
    /// The measured value.
    #[serde(default, alias = "Value", deserialize_with = "null_as_default")]
    pub value: f64,
    /// Unit of the value.
    #[serde(default, alias = "Unit", deserialize_with = "null_as_default")]
    pub unit: String,
    /// Unix timestamp in seconds.
    #[serde(default, alias = "Time", deserialize_with = "null_as_default")]
    pub time: i64,
    /// One of `gauge`, `rate`, `count`, `counter` or `timestamp`.
    #[serde(default, alias = "Mtype", deserialize_with = "null_as_default")]
    pub mtype: String,
    /// Tags in `key:value` form.
    #[serde(default, alias = "Tags", deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_deserialize_json() {
        let json = r#"{
            "name": "a.b",
            "org_id": 5,
            "interval": 10,
            "value": 1.5,
            "time": 1700000000,
            "tags": null
        }"#;

        let metric: MetricData = serde_json::from_str(json).unwrap();
        assert_eq!(
            metric,
            MetricData {
                name: "a.b".to_owned(),
                org_id: 5,
                interval: 10,
                value: 1.5,
                time: 1700000000,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_deserialize_capitalized_names() {
        let json = r#"{"Name": "a.b", "OrgId": 3, "Mtype": "rate", "Tags": ["x:y"]}"#;

        let metric: MetricData = serde_json::from_str(json).unwrap();
        assert_eq!(metric.org_id, 3);
        assert_eq!(metric.mtype, "rate");
        assert_eq!(metric.tags, vec!["x:y".to_owned()]);
    }

    #[test]
    fn test_serialize_json() {
        let metric = MetricData {
            id: "1.abc".to_owned(),
            org_id: 1,
            name: "a".to_owned(),
            metric: "a".to_owned(),
            interval: 60,
            value: 2.0,
            mtype: DEFAULT_MTYPE.to_owned(),
            ..Default::default()
        };

        insta::assert_snapshot!(serde_json::to_string(&metric).unwrap(), @r###"{"id":"1.abc","org_id":1,"name":"a","metric":"a","interval":60,"value":2.0,"unit":"","time":0,"mtype":"gauge","tags":[]}"###);
    }
}

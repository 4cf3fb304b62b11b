//! Decoding of the inverter's push telemetry payload into sink points.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::sink::Point;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushPayload {
    pub head: Head,
    pub body: EnergyBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Head {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Debug, Deserialize)]
pub struct EnergyBody {
    #[serde(rename = "PAC", default)]
    pub pac: Metric,
    #[serde(rename = "DAY_ENERGY", default)]
    pub day: Metric,
    #[serde(rename = "YEAR_ENERGY", default)]
    pub year: Metric,
    #[serde(rename = "TOTAL_ENERGY", default)]
    pub total: Metric,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metric {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub values: HashMap<String, f64>,
}

impl Metric {
    /// The inverter reports per-device values keyed by index; only device
    /// `"1"` is consumed. A missing entry reads as zero.
    fn value(&self) -> f64 {
        self.values.get("1").copied().unwrap_or_default()
    }
}

impl PushPayload {
    /// The four normalized points of one telemetry snapshot. An absent
    /// metric yields a zero-valued point rather than dropping the batch.
    pub fn into_points(self) -> Vec<Point> {
        let time = self.head.timestamp;
        [
            ("pac", self.body.pac),
            ("day", self.body.day),
            ("year", self.body.year),
            ("total", self.body.total),
        ]
        .into_iter()
        .map(|(name, metric)| Point {
            name: name.to_string(),
            value: metric.value(),
            unit: metric.unit,
            time,
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"{
        "Head": {
            "Timestamp": "2023-11-14T22:13:20.123+00:00",
            "RequestArguments": {"Query": "Inverter", "Scope": "System"},
            "Status": {"Code": 0, "Reason": "", "UserMessage": ""}
        },
        "Body": {
            "PAC": {"Unit": "W", "Values": {"1": 1234.5}},
            "DAY_ENERGY": {"Unit": "Wh", "Values": {"1": 8000}},
            "YEAR_ENERGY": {"Unit": "Wh", "Values": {"1": 44000}},
            "TOTAL_ENERGY": {"Unit": "Wh", "Values": {"1": 923000}}
        }
    }"#;

    #[test]
    fn normalizes_all_four_metrics() {
        let payload: PushPayload = serde_json::from_str(FULL).unwrap();
        let ts = payload.head.timestamp;
        assert_eq!(ts.timestamp(), 1_700_000_000);

        let points = payload.into_points();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].name, "pac");
        assert_eq!(points[0].value, 1234.5);
        assert_eq!(points[0].unit, "W");
        assert_eq!(points[0].time, ts);
        assert_eq!(points[1].name, "day");
        assert_eq!(points[1].value, 8000.0);
        assert_eq!(points[3].name, "total");
        assert_eq!(points[3].value, 923000.0);
    }

    #[test]
    fn missing_metric_reads_as_zero() {
        let body = r#"{
            "Head": {"Timestamp": "2023-11-14T22:13:20+00:00"},
            "Body": {
                "DAY_ENERGY": {"Unit": "Wh", "Values": {"1": 8000}},
                "YEAR_ENERGY": {"Unit": "Wh", "Values": {"2": 44000}},
                "TOTAL_ENERGY": {"Unit": "Wh", "Values": {"1": 923000}}
            }
        }"#;
        let payload: PushPayload = serde_json::from_str(body).unwrap();
        let points = payload.into_points();
        // PAC absent entirely, YEAR has no "1" entry: both zero, rest intact
        assert_eq!(points[0].value, 0.0);
        assert_eq!(points[1].value, 8000.0);
        assert_eq!(points[2].value, 0.0);
        assert_eq!(points[3].value, 923000.0);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(serde_json::from_str::<PushPayload>("{not json").is_err());
        assert!(serde_json::from_str::<PushPayload>(r#"{"Body": {}}"#).is_err());
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub time: DateTime<Utc>,
    pub energy: f64,
}

/// Channel name → chronological points, as received from the portal.
pub type Series = BTreeMap<String, Vec<DataPoint>>;

/// Shape of the portal's chart endpoint. Each data entry is an
/// `[epoch_millis, energy]` pair.
#[derive(Debug, Deserialize)]
struct ChartDetail {
    series: Vec<ChartSeries>,
}

#[derive(Debug, Deserialize)]
struct ChartSeries {
    name: String,
    data: Vec<[f64; 2]>,
}

/// Strict decode of one day's chart JSON. Malformed JSON or a schema
/// mismatch fails the whole body; there is no partial decoding.
pub fn decode(body: &[u8]) -> Result<Series> {
    let detail: ChartDetail = serde_json::from_slice(body)?;
    let mut out = Series::new();
    let mut total = 0usize;
    for s in detail.series {
        let mut points = Vec::with_capacity(s.data.len());
        for [millis, energy] in s.data {
            let time = DateTime::from_timestamp_millis(millis as i64)
                .ok_or_else(|| AppError::Decode(format!("timestamp out of range: {millis}")))?;
            points.push(DataPoint { time, energy });
        }
        total += points.len();
        out.insert(s.name, points);
    }
    info!(points = total, "decoded chart data");
    Ok(out)
}

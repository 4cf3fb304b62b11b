use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{AppError, Result};

/// A normalized, sink-bound reading. Both the historical fetch path and the
/// push intake converge on this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub time: DateTime<Utc>,
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn put(&self, measurement: &str, points: &[Point]) -> Result<()>;
}

/// InfluxDB 1.x sink: line protocol over the `/write` HTTP endpoint.
/// Credentials come from `INFLUX_USER` / `INFLUX_PASSW`.
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: reqwest::Url,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxSink {
    pub fn new(base_url: &str, database: &str, retention_policy: &str) -> Result<Self> {
        let base = reqwest::Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("parse {base_url:?}: {e}")))?;
        let mut write_url = base
            .join("write")
            .map_err(|e| AppError::Config(format!("write URL from {base_url:?}: {e}")))?;
        {
            let mut query = write_url.query_pairs_mut();
            query.append_pair("db", database);
            if !retention_policy.is_empty() {
                query.append_pair("rp", retention_policy);
            }
            query.append_pair("precision", "ms");
        }
        Ok(Self {
            client: reqwest::Client::new(),
            write_url,
            username: std::env::var("INFLUX_USER").ok(),
            password: std::env::var("INFLUX_PASSW").ok(),
        })
    }
}

#[async_trait]
impl Sink for InfluxSink {
    async fn put(&self, measurement: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = to_line_protocol(measurement, points);
        let mut req = self.client.post(self.write_url.clone()).body(body);
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(AppError::Sink(format!("write returned {status}: {detail}")));
        }
        debug!(points = points.len(), "wrote batch");
        Ok(())
    }
}

/// One line per point: `measurement,name=<n> energy=<v>,unit="<u>" <epoch-ms>`.
fn to_line_protocol(measurement: &str, points: &[Point]) -> String {
    let mut out = String::new();
    for p in points {
        out.push_str(&escape_key(measurement));
        out.push_str(",name=");
        out.push_str(&escape_key(&p.name));
        out.push_str(" energy=");
        out.push_str(&p.value.to_string());
        out.push_str(",unit=\"");
        out.push_str(&escape_field_string(&p.unit));
        out.push_str("\" ");
        out.push_str(&p.time.timestamp_millis().to_string());
        out.push('\n');
    }
    out
}

fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn escape_field_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

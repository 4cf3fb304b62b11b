// Intake endpoint tests against a recording stub sink. The handler acks
// before the sink write runs, so assertions on the sink poll briefly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;

use solarweb_to_influx::error::{AppError, Result};
use solarweb_to_influx::intake::{self, IntakeState};
use solarweb_to_influx::sink::{Point, Sink};

const INTAKE_PATH: &str = "/solarapi/v1/current/";

#[derive(Default)]
struct RecordingSink {
    puts: Mutex<Vec<(String, Vec<Point>)>>,
}

#[async_trait]
impl Sink for RecordingSink {
    async fn put(&self, measurement: &str, points: &[Point]) -> Result<()> {
        self.puts
            .lock()
            .unwrap()
            .push((measurement.to_string(), points.to_vec()));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn put(&self, _measurement: &str, _points: &[Point]) -> Result<()> {
        Err(AppError::Sink("sink is down".into()))
    }
}

fn server(sink: Arc<dyn Sink>) -> TestServer {
    let state = IntakeState {
        sink,
        measurement: "solar_energy".into(),
    };
    TestServer::new(intake::router(INTAKE_PATH, state)).unwrap()
}

async fn recorded(sink: &RecordingSink) -> Vec<(String, Vec<Point>)> {
    // the write is spawned after the ack; give it a moment
    for _ in 0..50 {
        {
            let puts = sink.puts.lock().unwrap();
            if !puts.is_empty() {
                return puts.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Vec::new()
}

const PAYLOAD: &str = r#"{
    "Head": {"Timestamp": "2023-11-14T22:13:20+00:00", "Status": {"Code": 0}},
    "Body": {
        "PAC": {"Unit": "W", "Values": {"1": 1234.5}},
        "DAY_ENERGY": {"Unit": "Wh", "Values": {"1": 8000}},
        "YEAR_ENERGY": {"Unit": "Wh", "Values": {"1": 44000}},
        "TOTAL_ENERGY": {"Unit": "Wh", "Values": {"1": 923000}}
    }
}"#;

#[tokio::test]
async fn well_formed_payload_is_acked_and_forwarded() {
    let sink = Arc::new(RecordingSink::default());
    let server = server(sink.clone());

    let response = server.post(INTAKE_PATH).text(PAYLOAD).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let puts = recorded(&sink).await;
    assert_eq!(puts.len(), 1);
    let (measurement, points) = &puts[0];
    assert_eq!(measurement, "solar_energy");
    assert_eq!(points.len(), 4);
    assert_eq!(points[0].name, "pac");
    assert_eq!(points[0].value, 1234.5);
    assert_eq!(points[0].unit, "W");
    assert_eq!(points[0].time.timestamp(), 1_700_000_000);
}

#[tokio::test]
async fn missing_metric_forwards_a_zero_point() {
    let sink = Arc::new(RecordingSink::default());
    let server = server(sink.clone());

    let payload = r#"{
        "Head": {"Timestamp": "2023-11-14T22:13:20+00:00"},
        "Body": {
            "DAY_ENERGY": {"Unit": "Wh", "Values": {"1": 8000}},
            "YEAR_ENERGY": {"Unit": "Wh", "Values": {"1": 44000}},
            "TOTAL_ENERGY": {"Unit": "Wh", "Values": {"1": 923000}}
        }
    }"#;
    let response = server.post(INTAKE_PATH).text(payload).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let puts = recorded(&sink).await;
    assert_eq!(puts.len(), 1);
    let points = &puts[0].1;
    assert_eq!(points[0].name, "pac");
    assert_eq!(points[0].value, 0.0);
    assert_eq!(points[1].value, 8000.0);
}

#[tokio::test]
async fn malformed_body_is_rejected_without_touching_the_sink() {
    let sink = Arc::new(RecordingSink::default());
    let server = server(sink.clone());

    let response = server.post(INTAKE_PATH).text("this is not json").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(!response.text().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sink.puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sink_failure_does_not_change_the_ack() {
    let server = server(Arc::new(FailingSink));

    let response = server.post(INTAKE_PATH).text(PAYLOAD).await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

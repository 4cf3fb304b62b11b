use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use solarweb_to_influx::config::PortalConfig;
use solarweb_to_influx::fetch::Fetcher;
use solarweb_to_influx::intake::{self, IntakeState};
use solarweb_to_influx::series::Series;
use solarweb_to_influx::sink::{InfluxSink, Point, Sink};

#[derive(Parser)]
#[command(name = "solarweb-to-influx", version)]
#[command(about = "Pull per-day energy series from Solar.Web and republish them to InfluxDB")]
struct Cli {
    /// Path to the sealed cookie store
    #[arg(long, default_value = "solarweb.cookies")]
    cookies: PathBuf,

    /// Portal base URL
    #[arg(long, default_value = "https://www.solarweb.com")]
    base: String,

    /// Logon URL template
    #[arg(long, default_value = "{{BASE}}/Account/GuestLogOn?pvSystemId={{systemID}}")]
    logon: String,

    /// Detail data URL template; the bracketed date token is replaced with
    /// each requested day
    #[arg(
        long,
        default_value = "{{BASE}}/NewCharts/GetDetailData/{{systemID}}/00000000-0000-0000-0000-000000000000/Day/{{YYYY/M/D}}"
    )]
    data: String,

    /// Path prefix the portal redirects to when the session is gone
    #[arg(long, default_value = "/Account/LogOn")]
    logon_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch day series and print them as "channel";"timestamp";energy lines
    Dump {
        system_id: String,
        /// Days as YYYY-MM-DD; none means today, a [start end] pair spanning
        /// more than one day is expanded to the inclusive range
        days: Vec<String>,
    },
    /// Fetch day series and write the points to InfluxDB
    Push {
        system_id: String,
        days: Vec<String>,
        #[command(flatten)]
        sink: SinkArgs,
    },
    /// Accept live push telemetry from the inverter and forward it to InfluxDB
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,
        /// Intake endpoint path the inverter pushes to
        #[arg(long, default_value = "/solarapi/v1/current/")]
        path: String,
        #[command(flatten)]
        sink: SinkArgs,
    },
}

#[derive(Args)]
struct SinkArgs {
    /// InfluxDB base URL
    #[arg(long, default_value = "http://localhost:8086")]
    influx: String,

    #[arg(long, default_value = "solar")]
    database: String,

    #[arg(long, default_value = "")]
    retention_policy: String,

    #[arg(long, default_value = "solar_energy")]
    measurement: String,
}

impl SinkArgs {
    fn open(&self) -> anyhow::Result<InfluxSink> {
        Ok(InfluxSink::new(
            &self.influx,
            &self.database,
            &self.retention_policy,
        )?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let Cli {
        cookies,
        base,
        logon,
        data,
        logon_path,
        command,
    } = Cli::parse();
    let portal = move |system_id: String| {
        PortalConfig::new(base, logon, data, system_id, cookies, logon_path)
    };

    match command {
        Commands::Dump { system_id, days } => {
            let fetcher = Fetcher::new(portal(system_id));
            let (tx, mut rx) = mpsc::channel::<Series>(16);
            let task = tokio::spawn(fetcher.fetch_days(days, tx));
            while let Some(series) = rx.recv().await {
                print_series(&series);
            }
            task.await??;
        }
        Commands::Push {
            system_id,
            days,
            sink,
        } => {
            let influx = sink.open()?;
            let fetcher = Fetcher::new(portal(system_id));
            let (tx, mut rx) = mpsc::channel::<Series>(16);
            let task = tokio::spawn(fetcher.fetch_days(days, tx));
            while let Some(series) = rx.recv().await {
                let points = series_points(&series);
                info!(points = points.len(), "writing batch");
                // best-effort: a failed batch must not abort the others
                if let Err(e) = influx.put(&sink.measurement, &points).await {
                    error!(error = %e, "write batch to sink failed");
                }
            }
            task.await??;
        }
        Commands::Serve { listen, path, sink } => {
            let state = IntakeState {
                sink: Arc::new(sink.open()?),
                measurement: sink.measurement,
            };
            let app = intake::router(&path, state);
            let listener = tokio::net::TcpListener::bind(&listen).await?;
            info!(addr = %listener.local_addr()?, path = %path, "intake listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

fn print_series(series: &Series) {
    for (channel, points) in series {
        for p in points {
            println!("\"{}\";\"{}\";{}", channel, p.time.to_rfc3339(), p.energy);
        }
    }
}

fn series_points(series: &Series) -> Vec<Point> {
    series
        .iter()
        .flat_map(|(channel, points)| {
            points.iter().map(move |p| Point {
                name: channel.clone(),
                value: p.energy,
                unit: String::new(),
                time: p.time,
            })
        })
        .collect()
}

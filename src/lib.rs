pub mod config;
pub mod error;
pub mod fetch;
pub mod intake;
pub mod jar;
pub mod push;
pub mod series;
pub mod session;
pub mod sink;

pub use config::PortalConfig;
pub use error::{AppError, Result};
pub use fetch::Fetcher;
pub use series::{DataPoint, Series};
pub use sink::{InfluxSink, Point, Sink};

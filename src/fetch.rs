use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::PortalConfig;
use crate::error::{AppError, Result};
use crate::series::{self, Series};
use crate::session::Session;

/// Pulls per-day chart data from the portal, holding one lazily-created
/// session that all concurrent day fetches share.
pub struct Fetcher {
    config: Arc<PortalConfig>,
    session: OnceCell<Session>,
}

impl Fetcher {
    pub fn new(config: PortalConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            session: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// The shared session, created by the first caller; the client and the
    /// cookie store load carry connection/IO cost, so this runs at most once.
    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| async { Session::open(&self.config) })
            .await
    }

    /// GET one fully-resolved data URL, replaying the logon and retrying
    /// exactly once when the portal signals an expired session.
    ///
    /// The raw body is returned even on non-2xx statuses: the portal is known
    /// to serve valid JSON on paths that never hit the happy status line, so
    /// the decoder is the authoritative failure signal.
    pub async fn fetch_raw(&self, data_url: &str) -> Result<Vec<u8>> {
        let session = self.session().await?;
        let resp = session.get(data_url).await?;

        let resp = if resp.status().is_redirection() {
            debug!(url = data_url, "logon required, replaying logon");
            // drain before reusing the connection
            let _ = resp.bytes().await;

            let logon = session.get(&self.config.resolved().logon_url).await?;
            let _ = logon.bytes().await;

            // an unsaved session defeats reuse, so this failure is fatal
            session.save()?;

            let retry = session.get(data_url).await?;
            if retry.status().is_redirection() {
                // no second retry; the decoder will fail on whatever this is
                warn!(url = data_url, status = %retry.status(),
                    "still redirected after logon");
            }
            retry
        } else {
            resp
        };

        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetch every requested day concurrently, sending decoded `Series` to
    /// `tx` in completion order. All launched fetches run to termination; the
    /// first error observed becomes the overall result, later ones are only
    /// logged. The channel closes once every task has finished.
    pub async fn fetch_days(
        self: Arc<Self>,
        days: Vec<String>,
        tx: mpsc::Sender<Series>,
    ) -> Result<()> {
        let dates = expand_days(&days, Utc::now().date_naive());
        let resolved = self.config.resolved().clone();

        let mut tasks = JoinSet::new();
        for day in dates {
            let url = resolved.data_url_for(day);
            let fetcher = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let raw = fetcher.fetch_raw(&url).await?;
                let series = series::decode(&raw)?;
                // a receiver that hung up is not a fetch failure
                let _ = tx.send(series).await;
                Ok::<_, AppError>(())
            });
        }
        drop(tx);

        let mut first_err: Option<AppError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result =
                joined.unwrap_or_else(|e| Err(AppError::Internal(format!("fetch task: {e}"))));
            if let Err(e) = result {
                error!(error = %e, "day fetch failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Expand day arguments into concrete dates: no arguments means today, a
/// two-element pair spanning more than one day becomes the inclusive range,
/// unparseable entries are skipped, duplicates are dropped.
pub fn expand_days(args: &[String], today: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(args.len().max(1));
    if args.is_empty() {
        dates.push(today);
    } else {
        for arg in args {
            match NaiveDate::parse_from_str(arg, "%Y-%m-%d") {
                Ok(d) => dates.push(d),
                Err(e) => {
                    error!(date = %arg, error = %e, "cannot parse given date as YYYY-MM-DD")
                }
            }
        }
    }

    if dates.len() == 2 {
        let (start, end) = (dates[0], dates[1]);
        if end.pred_opt().is_some_and(|prev| start < prev) {
            dates.clear();
            let mut d = start;
            while d <= end {
                dates.push(d);
                match d.succ_opt() {
                    Some(next) => d = next,
                    None => break,
                }
            }
        }
    }

    let mut seen = HashSet::new();
    dates.retain(|d| seen.insert(*d));
    dates
}

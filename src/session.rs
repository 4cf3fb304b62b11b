use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cookie_store::CookieStore;
use reqwest::redirect;
use reqwest_cookie_store::CookieStoreMutex;
use tracing::{debug, warn};

use crate::config::PortalConfig;
use crate::error::{AppError, Result};
use crate::jar::{self, SealedKey};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One HTTP client bound to one persistable cookie jar. Cloning is cheap and
/// every clone shares the same client, jar and sealed key.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: reqwest::Client,
    jar: Arc<CookieStoreMutex>,
    cookie_path: PathBuf,
    passphrase: Vec<u8>,
    /// Key of the sealed store; also serializes saves, so concurrent fetches
    /// that both hit the logon path cannot interleave their writes.
    key: Mutex<Option<SealedKey>>,
}

impl Session {
    /// Build the client and load the persisted cookie store. A missing or
    /// unreadable store is not fatal: it degrades to an empty jar, which
    /// makes the first data request take the logon path.
    pub fn open(config: &PortalConfig) -> Result<Self> {
        let passphrase = config.system_id.as_bytes().to_vec();
        let (key, store) = match jar::open(&config.cookie_path, &passphrase) {
            Ok((key, bytes)) => match cookie_store::serde::json::load_all(&bytes[..]) {
                Ok(store) => (Some(key), store),
                Err(e) => {
                    warn!(path = %config.cookie_path.display(), error = %e,
                        "cookie store unreadable, starting with an empty jar");
                    (Some(key), CookieStore::default())
                }
            },
            Err(e) => {
                warn!(path = %config.cookie_path.display(), error = %e,
                    "cannot open cookie store, starting with an empty jar");
                (None, CookieStore::default())
            }
        };
        let jar = Arc::new(CookieStoreMutex::new(store));

        // Follow redirects except onto the logon page: those are surfaced to
        // the caller as-is so the fetch layer can replay the logon.
        let logon_path = config.logon_path.clone();
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.url().path().starts_with(&logon_path) {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .redirect(policy)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                jar,
                cookie_path: config.cookie_path.clone(),
                passphrase,
                key: Mutex::new(key),
            }),
        })
    }

    /// GET with response logging; statuses above 299 are warned here and
    /// interpreted by the caller.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!(url, "GET");
        let resp = self.inner.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "request failed");
            AppError::Http(e)
        })?;
        let status = resp.status();
        if status.as_u16() > 299 && !status.is_redirection() {
            warn!(url, %status, "unexpected response status");
        } else {
            debug!(url, %status, "response");
        }
        Ok(resp)
    }

    /// Persist the cookie store. Called after a successful logon; failure is
    /// fatal to the fetch, since an unsaved session defeats reuse.
    pub fn save(&self) -> Result<()> {
        let mut key = self.inner.key.lock().unwrap();
        let mut buf = Vec::new();
        {
            let store = self.inner.jar.lock().unwrap();
            // Session cookies are typically non-persistent; keeping them is
            // the whole point of the store, so save everything.
            cookie_store::serde::json::save_incl_expired_and_nonpersistent(&store, &mut buf)
                .map_err(|e| AppError::CookieStore(format!("serialize cookie store: {e}")))?;
        }
        let saved = jar::save(
            &self.inner.cookie_path,
            &self.inner.passphrase,
            key.as_ref(),
            &buf,
        )?;
        *key = Some(saved);
        debug!(path = %self.inner.cookie_path.display(), "cookie store saved");
        Ok(())
    }
}

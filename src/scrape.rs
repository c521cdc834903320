use core::time::Duration;
use std::{fs, io, path::Path, sync::Arc};

use anyhow::Context;
use parking_lot::RwLock;
use reqwest::{
    Client, ClientBuilder,
    header::{COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, Serialize};

pub mod puppeteer;

pub const DEFAULT_BASE_URL: &str = "http://gepia2.cancer-pku.cn";
pub const SURVIVAL_PAGE: &str = "/#survival";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Cookies and user agent captured from a browser visit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "Cookie")]
    pub cookie: String,
    #[serde(rename = "User-Agent", default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Reads a JSON object of request headers. A missing file means no extra
/// headers.
pub fn load_headers(path: &Path) -> anyhow::Result<HeaderMap> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(target: "session", "{} not found, sending default headers", path.display());
            return Ok(HeaderMap::new());
        }
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    let raw: hashbrown::HashMap<String, String> =
        serde_json::from_str(&text).with_context(|| format!("{} is not a JSON object of strings", path.display()))?;
    headers_from_pairs(raw)
}

pub fn headers_from_pairs<I, K, V>(pairs: I) -> anyhow::Result<HeaderMap>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for (k, v) in pairs {
        let (k, v) = (k.as_ref(), v.as_ref());
        // the session supplies these
        if k.eq_ignore_ascii_case("cookie") || k.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let name = HeaderName::try_from(k).with_context(|| format!("bad header name {k:?}"))?;
        let value = HeaderValue::try_from(v).with_context(|| format!("bad value for header {k}"))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn builder(timeout: Duration) -> ClientBuilder {
    Client::builder().connect_timeout(CONNECT_TIMEOUT).timeout(timeout)
}

pub fn session_client(session: &Session, headers: &HeaderMap, timeout: Duration) -> reqwest::Result<Client> {
    let mut default_headers = headers.clone();
    if let Ok(cookie) = HeaderValue::try_from(session.cookie.as_str())
        && !session.cookie.is_empty()
    {
        default_headers.insert(COOKIE, cookie);
    }
    if let Some(user_agent) = session.user_agent.as_deref()
        && !default_headers.contains_key(USER_AGENT)
        && let Ok(user_agent) = HeaderValue::try_from(user_agent)
    {
        default_headers.insert(USER_AGENT, user_agent);
    }

    builder(timeout).default_headers(default_headers).build()
}

#[derive(Clone, Debug)]
pub enum SessionSource {
    /// Reuse a cookie string captured earlier.
    Static(Session),
    /// Visit the survival page in Chrome and keep its cookies.
    Browser { url: String, headless: bool },
}

impl SessionSource {
    pub async fn acquire(&self) -> anyhow::Result<Session> {
        match self {
            Self::Static(session) => Ok(session.clone()),
            Self::Browser { url, headless } => {
                let (url, headless) = (url.clone(), *headless);
                tokio::task::spawn_blocking(move || puppeteer::acquire_session(&url, headless)).await?
            }
        }
    }
}

/// Session material plus the client built from it. Immutable once made.
#[derive(Debug)]
pub struct SessionHandle {
    pub generation: u64,
    pub session: Session,
    pub client: Client,
}

/// Hands the current session to every worker and replaces it when the
/// service stops accepting it.
pub struct SessionStore {
    source: SessionSource,
    headers: HeaderMap,
    timeout: Duration,
    current: RwLock<Arc<SessionHandle>>,
    refreshing: tokio::sync::Mutex<()>,
}

impl SessionStore {
    pub async fn connect(source: SessionSource, headers: HeaderMap, timeout: Duration) -> anyhow::Result<Self> {
        let session = source.acquire().await.context("cannot acquire session")?;
        tracing::info!(target: "session", "session acquired ({} cookie bytes)", session.cookie.len());
        let client = session_client(&session, &headers, timeout)?;
        Ok(Self {
            source,
            headers,
            timeout,
            current: RwLock::new(Arc::new(SessionHandle {
                generation: 0,
                session,
                client,
            })),
            refreshing: tokio::sync::Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<SessionHandle> {
        self.current.read().clone()
    }

    /// Replaces the session that was current at `stale`. Callers racing on
    /// the same stale generation share one acquisition.
    pub async fn refresh(&self, stale: u64) -> anyhow::Result<Arc<SessionHandle>> {
        let _guard = self.refreshing.lock().await;

        let current = self.current();
        if current.generation != stale {
            return Ok(current);
        }

        tracing::warn!(target: "session", "\x1b[33msession rejected, acquiring a new one\x1b[0m");
        let session = self.source.acquire().await.context("cannot re-acquire session")?;
        let client = session_client(&session, &self.headers, self.timeout)?;
        let fresh = Arc::new(SessionHandle {
            generation: stale + 1,
            session,
            client,
        });
        *self.current.write() = fresh.clone();
        Ok(fresh)
    }
}

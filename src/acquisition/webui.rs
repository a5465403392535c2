//! Device Web Dashboard Source
//!
//! Reads link metrics from the outdoor unit's HTTP dashboard. A "view" is a
//! page path (e.g. `/cellular_info.html`); a field is the text content of the
//! first element whose `name` attribute matches, e.g.
//!
//! ```text
//! <div name="rsrp_5g"><b>-85</b> dBm</div>   ->   "-85 dBm"
//! ```
//!
//! The dashboard rewrites these values on its own refresh cycle, so a read
//! polls the current view until the element shows up or the timeout expires.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use tokio::time::Instant;

use super::{SampleSource, SourceError};
use crate::config::defaults::{CONFLICT_PROBE_TIME_OUT_MS, LANDING_VIEW, SESSION_CONFLICT_CONTROL};
use crate::config::Credentials;

/// Delay between polls of a view while waiting for a field.
const FIELD_POLL_INTERVAL_MS: u64 = 100;

/// A fetched page younger than this is reused by the next field read, so one
/// acquisition cycle costs one request rather than one per field.
const PAGE_REUSE_MS: u64 = 150;

/// Any opening or closing tag: `(/?)` close marker, tag name.
const TAG_PATTERN: &str = r"<(/?)([A-Za-z][A-Za-z0-9]*)\b[^>]*>";

/// Live dashboard session.
pub struct WebSession {
    credentials: Credentials,
    view: String,
    page: Option<(Instant, String)>,
}

/// Outcome of a single page fetch, before it is mapped to a phase-specific error.
enum FetchError {
    Timeout,
    Status(StatusCode),
    Transport(String),
}

/// HTTP client for the device dashboard.
pub struct WebUiSource {
    base_url: String,
    client: Client,
    conflict_probe: Duration,
    patterns: HashMap<String, Regex>,
    tags: Regex,
    sessions_opened: u64,
}

impl WebUiSource {
    /// Create a source for the dashboard rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| SourceError::Transport(format!("HTTP client init: {e}")))?;
        let tags = Regex::new(TAG_PATTERN)
            .map_err(|e| SourceError::Transport(format!("bad tag pattern: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            conflict_probe: Duration::from_millis(CONFLICT_PROBE_TIME_OUT_MS),
            patterns: HashMap::new(),
            tags,
            sessions_opened: 0,
        })
    }

    fn url(&self, view: &str) -> String {
        if view.starts_with('/') {
            format!("{}{view}", self.base_url)
        } else {
            format!("{}/{view}", self.base_url)
        }
    }

    async fn fetch(
        &self,
        credentials: &Credentials,
        view: &str,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let request = self
            .client
            .get(self.url(view))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .timeout(timeout);

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        response.text().await.map_err(classify)
    }

    async fn submit(
        &self,
        credentials: &Credentials,
        view: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let response = self
            .client
            .post(self.url(view))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .form(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(FetchError::Status(status))
        }
    }

    fn pattern(&mut self, field: &str) -> Result<&Regex, SourceError> {
        if !self.patterns.contains_key(field) {
            let re = field_pattern(field)?;
            self.patterns.insert(field.to_string(), re);
        }
        self.patterns
            .get(field)
            .ok_or_else(|| SourceError::Transport(format!("pattern cache miss for {field}")))
    }

    /// Look for the "log out other sessions" control and press it if shown.
    /// Absence, or any failure while probing, means there is nothing to resolve.
    async fn resolve_session_conflict(&self, session: &WebSession, landing: &str) {
        let prompt = control_present(landing, SESSION_CONFLICT_CONTROL) || {
            match self.fetch(&session.credentials, LANDING_VIEW, self.conflict_probe).await {
                Ok(page) => control_present(&page, SESSION_CONFLICT_CONTROL),
                Err(_) => false,
            }
        };

        if !prompt {
            tracing::debug!("No competing dashboard session");
            return;
        }

        tracing::info!("Another dashboard session is active, taking over");
        let form = [(SESSION_CONFLICT_CONTROL, SESSION_CONFLICT_CONTROL)];
        if let Err(e) = self
            .submit(&session.credentials, LANDING_VIEW, &form, self.conflict_probe)
            .await
        {
            tracing::warn!(error = %describe(&e), "Failed to dismiss session conflict prompt");
        }
    }
}

#[async_trait]
impl SampleSource for WebUiSource {
    type Handle = WebSession;

    async fn connect(
        &mut self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<WebSession, SourceError> {
        tracing::info!(url = %self.base_url, "Opening device dashboard");

        let landing = self
            .fetch(credentials, LANDING_VIEW, timeout)
            .await
            .map_err(|e| SourceError::ConnectOrAuth(describe(&e)))?;

        let mut session = WebSession {
            credentials: credentials.clone(),
            view: LANDING_VIEW.to_string(),
            page: None,
        };
        self.resolve_session_conflict(&session, &landing).await;
        session.page = Some((Instant::now(), landing));

        self.sessions_opened += 1;
        tracing::info!(sessions_opened = self.sessions_opened, "Dashboard session established");
        Ok(session)
    }

    async fn navigate(
        &mut self,
        handle: &mut WebSession,
        target: &str,
        timeout: Duration,
    ) -> Result<(), SourceError> {
        let page = self
            .fetch(&handle.credentials, target, timeout)
            .await
            .map_err(|e| SourceError::ConnectOrAuth(format!("navigate to {target}: {}", describe(&e))))?;
        handle.view = target.to_string();
        handle.page = Some((Instant::now(), page));
        tracing::debug!(view = %target, "Navigated");
        Ok(())
    }

    async fn read_field(
        &mut self,
        handle: &mut WebSession,
        field: &str,
        timeout: Duration,
    ) -> Result<String, SourceError> {
        let deadline = Instant::now() + timeout;
        let pattern = self.pattern(field)?.clone();
        let timed_out = || SourceError::FieldTimeout {
            field: field.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        loop {
            let fresh = handle
                .page
                .as_ref()
                .filter(|(at, _)| at.elapsed() < Duration::from_millis(PAGE_REUSE_MS))
                .map(|(_, page)| page.clone());

            let page = match fresh {
                Some(page) => page,
                None => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(timed_out());
                    }
                    match self.fetch(&handle.credentials, &handle.view, remaining).await {
                        Ok(page) => {
                            handle.page = Some((Instant::now(), page.clone()));
                            page
                        }
                        Err(FetchError::Timeout) => return Err(timed_out()),
                        Err(FetchError::Status(StatusCode::NOT_FOUND)) => {
                            return Err(SourceError::FieldNotFound {
                                field: field.to_string(),
                                view: handle.view.clone(),
                            });
                        }
                        Err(FetchError::Status(s))
                            if s == StatusCode::UNAUTHORIZED || s == StatusCode::FORBIDDEN =>
                        {
                            return Err(SourceError::SessionExpired(s.to_string()));
                        }
                        Err(e) => return Err(SourceError::Transport(describe(&e))),
                    }
                }
            };

            if let Some(text) = extract_field(&pattern, &self.tags, &page) {
                return Ok(text);
            }

            // Not rendered yet: drop the cached page and poll again.
            handle.page = None;
            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }
            let pause = Duration::from_millis(FIELD_POLL_INTERVAL_MS).min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }

    async fn configure(
        &mut self,
        handle: &mut WebSession,
        option: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), SourceError> {
        self.submit(&handle.credentials, &handle.view, &[(option, value)], timeout)
            .await
            .map_err(|e| SourceError::Configure {
                option: option.to_string(),
                value: value.to_string(),
                message: describe(&e),
            })?;
        handle.page = None;
        Ok(())
    }

    async fn close(&mut self, handle: WebSession) {
        tracing::info!(view = %handle.view, "Closing dashboard session");
        drop(handle);
    }

    fn source_name(&self) -> &str {
        "WebUI"
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if let Some(status) = err.status() {
        FetchError::Status(status)
    } else {
        FetchError::Transport(err.to_string())
    }
}

fn describe(err: &FetchError) -> String {
    match err {
        FetchError::Timeout => "timed out".to_string(),
        FetchError::Status(s) => format!("HTTP {s}"),
        FetchError::Transport(msg) => msg.clone(),
    }
}

/// Regex matching the opening tag of the first element named `field`.
/// Capture 1 is the tag name.
fn field_pattern(field: &str) -> Result<Regex, SourceError> {
    let pattern = format!(
        r#"<([A-Za-z][A-Za-z0-9]*)\s(?:[^>]*\s)?name\s*=\s*["']{}["'][^>]*>"#,
        regex::escape(field)
    );
    Regex::new(&pattern).map_err(|e| SourceError::Transport(format!("bad field pattern: {e}")))
}

/// Text content of the element opened by `open`, with inner markup removed.
/// `None` until the element is closed and holds some text.
fn extract_field(open: &Regex, tags: &Regex, page: &str) -> Option<String> {
    let caps = open.captures(page)?;
    let element = caps.get(1)?.as_str();
    let body = &page[caps.get(0)?.end()..];

    let mut depth = 0usize;
    let mut end = None;
    for tag in tags.captures_iter(body) {
        if !tag[2].eq_ignore_ascii_case(element) {
            continue;
        }
        let whole = tag.get(0)?;
        if &tag[1] == "/" {
            if depth == 0 {
                end = Some(whole.start());
                break;
            }
            depth -= 1;
        } else if !whole.as_str().ends_with("/>") {
            depth += 1;
        }
    }

    let inner = tags.replace_all(&body[..end?], " ");
    let text = decode_entities(&inner);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn control_present(page: &str, control: &str) -> bool {
    let needle = format!("name=\"{control}\"");
    let alt = format!("name='{control}'");
    page.contains(&needle) || page.contains(&alt)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

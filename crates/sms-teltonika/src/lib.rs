//! # Teltonika router backend
//!
//! REST client for the SMS function of Teltonika routers (TRB245 and
//! relatives). The client logs in with username and password, keeps the
//! returned bearer token in a [`TokenStore`] so later invocations can skip
//! the login, and submits texts through one of the router's modems.
//!
//! ```rust,ignore
//! use sms_core::SendRequest;
//! use sms_teltonika::{RouterClient, RouterSettings};
//!
//! let settings = RouterSettings::new("https://192.168.1.1", "admin", "secret");
//! let mut client = RouterClient::new(&settings)?;
//! let report = client
//!     .send_sms(SendRequest::new("+491701234567", "Disk almost full"))
//!     .await?;
//! println!("{} SMS used", report.sms_used);
//! ```

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sms_core::{
    normalize_phone_number, split_message, ModemStatus, RouterApi, RouterConnector,
    RouterErrorEntry, SegmentReceipt, SendReport, SendRequest, SmsError, FALLBACK_MODEM,
};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

pub mod cache;
pub mod token;

pub use cache::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{extract_token, AuthToken, LoginResponse};

const LOGIN_PATH: &str = "/api/login";
const MODEMS_PATH: &str = "/api/modems/status";
const SEND_PATH: &str = "/api/messages/actions/send";

/// Everything needed to reach one router.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Router address, with or without scheme.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Check the router's TLS certificate. Off by default: most routers
    /// ship with a self-signed one.
    pub verify_tls: bool,
    /// Rewrite `http://` URLs to `https://`.
    pub force_https: bool,
    /// Modem used when a request does not name one.
    pub default_modem: String,
    /// Directory for the token cache; the home directory when `None`.
    pub cache_dir: Option<PathBuf>,
    /// Timeout for login and modem status calls.
    pub auth_timeout: Duration,
    /// Timeout for each send call.
    pub send_timeout: Duration,
}

impl RouterSettings {
    pub fn new<S: Into<String>>(url: S, username: S, password: S) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            verify_tls: false,
            force_https: true,
            default_modem: FALLBACK_MODEM.to_string(),
            cache_dir: None,
            auth_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(30),
        }
    }

    /// Base URL requests are built on, without trailing slash.
    pub fn base_url(&self) -> String {
        let url = self.url.trim().trim_end_matches('/');
        if url.starts_with("https://") {
            url.to_string()
        } else if let Some(rest) = url.strip_prefix("http://") {
            if self.force_https {
                format!("https://{rest}")
            } else {
                url.to_string()
            }
        } else {
            format!("https://{url}")
        }
    }

    /// Token store keyed by this router's URL.
    pub fn token_store(&self) -> FileTokenStore {
        FileTokenStore::for_router(&self.url, self.cache_dir.as_deref())
    }
}

/// Token currently in use plus the request decoration derived from it.
#[derive(Debug, Default)]
pub struct RouterSession {
    token: Option<AuthToken>,
}

impl RouterSession {
    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    fn adopt(&mut self, token: AuthToken) {
        self.token = Some(token);
    }

    fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_usable_at(now))
    }

    /// Adds `Authorization: Bearer` and the `sysauth` cookie.
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request
                .bearer_auth(token.value())
                .header(COOKIE, format!("sysauth={}", token.value())),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    data: SendData<'a>,
}

#[derive(Debug, Serialize)]
struct SendData<'a> {
    number: &'a str,
    message: &'a str,
    modem: &'a str,
}

#[derive(Debug, Deserialize)]
struct RouterSendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    errors: Vec<RouterErrorEntry>,
}

/// Authenticated client for one router.
pub struct RouterClient<S: TokenStore = FileTokenStore> {
    settings: RouterSettings,
    base_url: String,
    http: reqwest::Client,
    store: S,
    session: RouterSession,
}

impl RouterClient<FileTokenStore> {
    /// Client that caches its token next to the user's home directory.
    pub fn new(settings: &RouterSettings) -> Result<Self, SmsError> {
        Self::with_store(settings, settings.token_store())
    }
}

impl<S: TokenStore> RouterClient<S> {
    pub fn with_store(settings: &RouterSettings, store: S) -> Result<Self, SmsError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .map_err(|e| SmsError::Http(e.to_string()))?;
        Ok(Self {
            base_url: settings.base_url(),
            settings: settings.clone(),
            http,
            store,
            session: RouterSession::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &RouterSession {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Logs in unless a usable cached token exists (or `force` is set).
    ///
    /// Never fails: problems are logged and reported as `false`. Use
    /// [`RouterClient::try_authenticate`] to get the reason.
    pub async fn authenticate(&mut self, force: bool) -> bool {
        match self.try_authenticate(force).await {
            Ok(()) => true,
            Err(e) => {
                error!(router = %self.base_url, error = %e, "authentication failed");
                false
            }
        }
    }

    pub async fn try_authenticate(&mut self, force: bool) -> Result<(), SmsError> {
        if !force {
            let now = OffsetDateTime::now_utc();
            if let Some(token) = self.store.load(now) {
                info!(
                    remaining_secs = token.remaining_at(now).whole_seconds(),
                    "using cached router token"
                );
                self.session.adopt(token);
                return Ok(());
            }
        }

        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        debug!(%url, user = %self.settings.username, "logging in");
        let res = self
            .http
            .post(url)
            .json(&LoginRequest {
                username: &self.settings.username,
                password: &self.settings.password,
            })
            .timeout(self.settings.auth_timeout)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let cookies: Vec<(String, String)> = res
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(SmsError::Auth(format!("HTTP {}: {}", status, snippet(&text))));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| SmsError::Auth(format!("response is not valid JSON: {e}")))?;
        let login = LoginResponse { body, cookies };

        let Some((shape, extracted)) = extract_token(&login) else {
            return Err(SmsError::Auth(format!(
                "no token in response: {}",
                snippet(&login.body.to_string())
            )));
        };

        let token = AuthToken::new(
            extracted.value,
            extracted.ttl_seconds,
            OffsetDateTime::now_utc(),
        );
        self.store.save(&token);
        self.session.adopt(token);
        info!(shape, ttl_secs = extracted.ttl_seconds, "authenticated with router");
        Ok(())
    }

    /// A token is held and not within the safety margin of its expiry.
    pub fn is_token_valid(&self) -> bool {
        self.session.is_valid_at(OffsetDateTime::now_utc())
    }

    async fn ensure_authenticated(&mut self) -> Result<(), SmsError> {
        if self.is_token_valid() {
            return Ok(());
        }
        self.try_authenticate(false).await
    }

    /// Modem list from the router, `None` on any failure.
    pub async fn get_modems(&mut self) -> Option<ModemStatus> {
        if let Err(e) = self.ensure_authenticated().await {
            warn!(error = %e, "cannot list modems without authentication");
            return None;
        }

        let url = format!("{}{}", self.base_url, MODEMS_PATH);
        let res = self
            .session
            .apply(self.http.get(url))
            .timeout(self.settings.auth_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let res = match res {
            Ok(res) => res,
            Err(e) => {
                warn!(error = %e, "error retrieving modems");
                return None;
            }
        };

        match res.json::<ModemStatus>().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "modem status is not valid JSON");
                None
            }
        }
    }

    /// Sends one text, splitting it into numbered parts if it is too long.
    ///
    /// Parts go out strictly in order. The first failing part aborts the
    /// send with [`SmsError::PartialSend`]; later parts are never submitted.
    pub async fn send_sms(&mut self, req: SendRequest<'_>) -> Result<SendReport, SmsError> {
        let number = normalize_phone_number(req.to);
        if number.is_empty() {
            return Err(SmsError::Invalid("phone number is empty".into()));
        }

        if let Err(e) = self.ensure_authenticated().await {
            return Err(match e {
                SmsError::Auth(_) => e,
                other => SmsError::Auth(other.to_string()),
            });
        }

        let modem = req
            .modem
            .filter(|m| !m.is_empty())
            .unwrap_or(self.settings.default_modem.as_str())
            .to_string();
        let message_length = req.text.chars().count();

        if !req.split_long_messages || message_length <= req.split.max_length {
            let receipt = self.submit(1, &number, req.text, &modem).await?;
            info!(%number, %modem, sms_used = receipt.sms_used, "SMS sent");
            return Ok(SendReport {
                sms_used: receipt.sms_used,
                parts: 1,
                message_length,
                segments: vec![receipt],
            });
        }

        let segments = split_message(req.text, &req.split);
        let total = segments.len();
        info!(message_length, parts = total, "splitting long message");

        let mut receipts = Vec::with_capacity(total);
        for segment in &segments {
            let text = segment.render();
            debug!(
                part = segment.index,
                total,
                chars = segment.rendered_len(),
                "sending part"
            );
            match self.submit(segment.index, &number, &text, &modem).await {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => {
                    warn!(part = segment.index, total, error = %e, "part failed, aborting");
                    return Err(SmsError::PartialSend {
                        parts_sent: receipts.len(),
                        total_parts: total,
                        source: Box::new(e),
                    });
                }
            }
        }

        let sms_used = receipts.iter().map(|r| r.sms_used).sum();
        info!(%number, %modem, parts = total, sms_used, "all parts sent");
        Ok(SendReport {
            sms_used,
            parts: total,
            message_length,
            segments: receipts,
        })
    }

    async fn submit(
        &mut self,
        part: usize,
        number: &str,
        message: &str,
        modem: &str,
    ) -> Result<SegmentReceipt, SmsError> {
        let url = format!("{}{}", self.base_url, SEND_PATH);
        let payload = SendPayload {
            data: SendData {
                number,
                message,
                modem,
            },
        };
        let res = self
            .session
            .apply(self.http.post(url))
            .json(&payload)
            .timeout(self.settings.send_timeout)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;
        let raw: Option<Value> = serde_json::from_str(&text).ok();
        let parsed = raw
            .clone()
            .and_then(|v| serde_json::from_value::<RouterSendResponse>(v).ok());

        if let Some(body) = parsed {
            if body.success && status.is_success() {
                return Ok(SegmentReceipt {
                    part,
                    sms_used: body.data.get("sms_used").and_then(Value::as_u64).unwrap_or(0),
                    raw: raw.unwrap_or_default(),
                });
            }
            if !body.success && (status.is_success() || !body.errors.is_empty()) {
                let err = SmsError::from_router_errors(body.errors);
                error!(part, error = %err, "router rejected SMS");
                if let SmsError::Router { errors, .. } = &err {
                    if errors.iter().any(RouterErrorEntry::is_modem_error) {
                        self.log_available_modems().await;
                    }
                }
                return Err(err);
            }
        }

        if !status.is_success() {
            return Err(SmsError::Http(format!("HTTP {}: {}", status, snippet(&text))));
        }
        Err(SmsError::Http(format!("unexpected response: {}", snippet(&text))))
    }

    /// Diagnostic for modem errors: list what the router actually has.
    async fn log_available_modems(&mut self) {
        match self.get_modems().await {
            Some(status) if status.success => {
                for modem in &status.data {
                    info!(modem = %modem.summary(), "available modem");
                }
            }
            _ => warn!("could not retrieve modem list, check the router configuration"),
        }
    }
}

#[async_trait]
impl<S: TokenStore> RouterApi for RouterClient<S> {
    async fn authenticate(&mut self, force: bool) -> bool {
        RouterClient::authenticate(self, force).await
    }

    async fn get_modems(&mut self) -> Option<ModemStatus> {
        RouterClient::get_modems(self).await
    }

    async fn send_sms(&mut self, req: SendRequest<'_>) -> Result<SendReport, SmsError> {
        RouterClient::send_sms(self, req).await
    }
}

/// Opens a fresh [`RouterClient`] with a file token store per call.
#[derive(Debug, Clone)]
pub struct TeltonikaConnector {
    settings: RouterSettings,
}

impl TeltonikaConnector {
    pub fn new(settings: RouterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }
}

impl RouterConnector for TeltonikaConnector {
    fn connect(&self) -> Result<Box<dyn RouterApi>, SmsError> {
        Ok(Box::new(RouterClient::new(&self.settings)?))
    }
}

/// First 200 chars of a response body for error messages.
fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_https() {
        let mut settings = RouterSettings::new("192.168.1.1/", "admin", "pw");
        assert_eq!(settings.base_url(), "https://192.168.1.1");

        settings.url = "http://router.local".into();
        assert_eq!(settings.base_url(), "https://router.local");

        settings.force_https = false;
        assert_eq!(settings.base_url(), "http://router.local");

        settings.url = "https://router.local:8443/".into();
        assert_eq!(settings.base_url(), "https://router.local:8443");
    }

    #[test]
    fn defaults_match_the_router_api() {
        let settings = RouterSettings::new("r", "u", "p");
        assert!(!settings.verify_tls);
        assert_eq!(settings.default_modem, "1-1.4");
        assert_eq!(settings.auth_timeout, Duration::from_secs(10));
        assert_eq!(settings.send_timeout, Duration::from_secs(30));
    }

    #[test]
    fn send_payload_shape() {
        let payload = SendPayload {
            data: SendData {
                number: "0049170",
                message: "hi",
                modem: "1-1.4",
            },
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": {"number": "0049170", "message": "hi", "modem": "1-1.4"}})
        );
    }

    #[test]
    fn fresh_client_is_unauthenticated() {
        let settings = RouterSettings::new("https://router.local", "u", "p");
        let client = RouterClient::with_store(&settings, MemoryTokenStore::new()).unwrap();
        assert!(!client.is_token_valid());
        assert!(client.session().token().is_none());
    }
}

//! # SMS Core
//!
//! Core traits and types shared by the smsgate crates.
//!
//! This crate provides the building blocks that do not talk to the network:
//! - [`normalize_phone_number`] to turn `+49…` into the router's `0049…` form
//! - [`split_message`] to cut long texts into numbered SMS segments
//! - [`RouterApi`] / [`RouterConnector`], the seam between the gateway and a
//!   concrete router client
//! - common request, report and error types
//!
//! ## Example
//!
//! ```rust
//! use sms_core::{split_sms_message, SplitOptions};
//!
//! let text = "lorem ipsum ".repeat(30);
//! let parts = split_sms_message(&text, &SplitOptions::new(160));
//! assert!(parts[0].starts_with("1/3: "));
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod phone;
pub mod split;

pub use phone::normalize_phone_number;
pub use split::{
    split_message, split_sms_message, Segment, SplitOptions, DEFAULT_MAX_LENGTH,
    DEFAULT_PUNCTUATION_WINDOW, DEFAULT_WHITESPACE_WINDOW,
};

/// Modem used when none was chosen and the router did not list any.
pub const FALLBACK_MODEM: &str = "1-1.4";

/// Errors that can occur during SMS operations
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// Network, timeout or TLS failure talking to the router
    #[error("http error: {0}")]
    Http(String),
    /// Login rejected or no token in the login response
    #[error("authentication error: {0}")]
    Auth(String),
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    Invalid(String),
    /// The router answered `success: false`
    #[error("router error: {message}")]
    Router {
        message: String,
        errors: Vec<RouterErrorEntry>,
    },
    /// A multi-part send stopped at the first failing part
    #[error("Error sending part {}/{total_parts}: {source}", .parts_sent + 1)]
    PartialSend {
        parts_sent: usize,
        total_parts: usize,
        #[source]
        source: Box<SmsError>,
    },
    /// Missing or unusable configuration
    #[error("configuration error: {0}")]
    Config(String),
    /// Unexpected error occurred
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl SmsError {
    /// Builds a [`SmsError::Router`] from the router's error list.
    pub fn from_router_errors(errors: Vec<RouterErrorEntry>) -> Self {
        let message = if errors.is_empty() {
            "Unknown error".to_string()
        } else {
            join_router_errors(&errors)
        };
        Self::Router { message, errors }
    }

    /// Text the gateway reports back to its caller.
    pub fn detail(&self) -> String {
        match self {
            SmsError::Router { message, .. } => message.clone(),
            SmsError::PartialSend {
                parts_sent,
                total_parts,
                source,
            } => format!(
                "Error sending part {}/{}: {}",
                parts_sent + 1,
                total_parts,
                source.detail()
            ),
            other => other.to_string(),
        }
    }
}

/// Failures of one gateway request, each mapping to one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required parameter is missing or empty
    #[error("{0}")]
    Validation(String),
    /// No router URL or credentials configured
    #[error("Router configuration missing. Please configure config.yaml.")]
    NotConfigured,
    #[error("Authentication with router failed")]
    AuthenticationFailed,
    /// The router (or the way to it) refused the SMS
    #[error("SMS sending failed (error from router): {}", .0.detail())]
    SendFailed(SmsError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> HttpStatus {
        match self {
            GatewayError::Validation(_) => HttpStatus::BadRequest,
            GatewayError::NotConfigured | GatewayError::Internal(_) => {
                HttpStatus::InternalServerError
            }
            GatewayError::AuthenticationFailed => HttpStatus::Unauthorized,
            GatewayError::SendFailed(_) => HttpStatus::UnprocessableEntity,
        }
    }
}

impl From<SmsError> for GatewayError {
    fn from(e: SmsError) -> Self {
        match e {
            SmsError::Auth(_) => GatewayError::AuthenticationFailed,
            SmsError::Invalid(msg) => GatewayError::Validation(msg),
            SmsError::Config(msg) | SmsError::Unexpected(msg) => GatewayError::Internal(msg),
            other => GatewayError::SendFailed(other),
        }
    }
}

/// One entry of the router's `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterErrorEntry {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

impl RouterErrorEntry {
    pub fn is_modem_error(&self) -> bool {
        self.source.as_deref() == Some("modem")
    }
}

/// `"err1; err2"`, with `Unknown error` for entries without text.
pub fn join_router_errors(errors: &[RouterErrorEntry]) -> String {
    errors
        .iter()
        .map(|e| e.error.as_deref().unwrap_or("Unknown error"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// HTTP status code for web responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    UnprocessableEntity = 422,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A text to deliver through one of the router's modems.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest<'a> {
    pub to: &'a str,
    pub text: &'a str,
    /// Modem id; the client's default modem when `None` or empty.
    pub modem: Option<&'a str>,
    /// Split texts longer than `split.max_length` into numbered parts.
    pub split_long_messages: bool,
    pub split: SplitOptions,
}

impl<'a> SendRequest<'a> {
    pub fn new(to: &'a str, text: &'a str) -> Self {
        Self {
            to,
            text,
            modem: None,
            split_long_messages: true,
            split: SplitOptions::default(),
        }
    }

    pub fn via_modem(mut self, modem: &'a str) -> Self {
        self.modem = Some(modem);
        self
    }

    pub fn with_split(mut self, split: SplitOptions) -> Self {
        self.split = split;
        self
    }

    pub fn without_splitting(mut self) -> Self {
        self.split_long_messages = false;
        self
    }
}

/// Router acknowledgement for one submitted SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReceipt {
    /// 1-based part number.
    pub part: usize,
    pub sms_used: u64,
    /// Raw router payload for debugging / audit.
    pub raw: serde_json::Value,
}

/// Outcome of a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    /// SMS units the router charged, summed over all parts.
    pub sms_used: u64,
    /// Number of submitted parts; 1 for unsplit messages.
    pub parts: usize,
    /// Length of the original message in chars.
    pub message_length: usize,
    pub segments: Vec<SegmentReceipt>,
}

impl SendReport {
    pub fn is_multipart(&self) -> bool {
        self.parts > 1
    }
}

/// Response of the router's modem status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModemStatus {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<ModemInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ModemInfo {
    /// One-line description used in logs and the CLI listing.
    pub fn summary(&self) -> String {
        format!(
            "ID: {} | Name: {}{} | Status: {} | Operator: {}",
            self.id.as_deref().unwrap_or("unknown"),
            self.name.as_deref().unwrap_or("Unnamed"),
            if self.primary { " (Primary)" } else { "" },
            self.state.as_deref().unwrap_or("unknown"),
            self.operator.as_deref().unwrap_or(""),
        )
    }
}

impl ModemStatus {
    /// Primary modem, else the first listed one.
    pub fn select_modem(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.data
            .iter()
            .find(|m| m.primary)
            .or_else(|| self.data.first())
            .and_then(|m| m.id.as_deref())
    }
}

/// Generic HTTP response that can be converted to any framework's response type
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: HttpStatus,
    pub body: String,
    pub content_type: String,
}

impl GatewayResponse {
    pub fn json(status: HttpStatus, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string()),
            content_type: "application/json".to_string(),
        }
    }

    pub fn error(status: HttpStatus, detail: &str) -> Self {
        Self::json(status, &serde_json::json!({ "detail": detail }))
    }
}

/// An authenticated conversation with one router.
///
/// Implementations own their session state, so one instance serves one
/// logical request at a time.
#[async_trait]
pub trait RouterApi: Send {
    /// Obtain a usable token, from cache unless `force` is set.
    async fn authenticate(&mut self, force: bool) -> bool;

    /// Modem list, or `None` if it could not be fetched.
    async fn get_modems(&mut self) -> Option<ModemStatus>;

    /// Send one text, splitting it if requested.
    async fn send_sms(&mut self, req: SendRequest<'_>) -> Result<SendReport, SmsError>;
}

/// Opens independent [`RouterApi`] sessions, one per inbound request.
pub trait RouterConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn RouterApi>, SmsError>;
}

//! Framework-agnostic handling of gateway requests.
//!
//! Adapters hand over the raw query string and convert the resulting
//! [`GatewayResponse`] into their framework's response type.

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use sms_core::{
    normalize_phone_number, GatewayError, GatewayResponse, HttpStatus, RouterConnector,
    SendReport, SendRequest, SplitOptions, FALLBACK_MODEM,
};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

static ENCODED_BYTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").expect("static regex is valid"));

/// Query parameters of `GET /`.
///
/// `username` and `password` are accepted for compatibility with existing
/// callers; the router is always reached with the configured credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendParams {
    pub username: Option<String>,
    pub password: Option<String>,
    pub number: Option<String>,
    pub text: Option<String>,
}

impl SendParams {
    pub fn from_query(query: &str) -> Result<Self, GatewayError> {
        serde_urlencoded::from_str(query)
            .map_err(|e| GatewayError::Validation(format!("malformed query string: {e}")))
    }
}

/// Percent-decodes `param` once more if it still contains `%XX` sequences.
///
/// Some callers encode twice; values that do not decode to valid UTF-8 are
/// returned unchanged.
pub fn decode_url_parameter(param: &str) -> String {
    if !ENCODED_BYTE.is_match(param) {
        return param.to_string();
    }
    match urlencoding::decode(param) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!(error = %e, "URL decoding failed, using original");
            param.to_string()
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, GatewayError> {
    value.ok_or_else(|| GatewayError::Validation(format!("Missing query parameter: {name}")))
}

/// Turns gateway requests into router sends.
#[derive(Clone)]
pub struct GatewayProcessor {
    connector: Option<Arc<dyn RouterConnector>>,
    split: SplitOptions,
    fallback_modem: String,
}

impl GatewayProcessor {
    pub fn new(connector: Arc<dyn RouterConnector>) -> Self {
        Self {
            connector: Some(connector),
            split: SplitOptions::default(),
            fallback_modem: FALLBACK_MODEM.to_string(),
        }
    }

    /// Processor without router configuration; every send answers 500.
    pub fn unconfigured() -> Self {
        Self {
            connector: None,
            split: SplitOptions::default(),
            fallback_modem: FALLBACK_MODEM.to_string(),
        }
    }

    pub fn with_split(mut self, split: SplitOptions) -> Self {
        self.split = split;
        self
    }

    pub fn with_fallback_modem(mut self, modem: impl Into<String>) -> Self {
        self.fallback_modem = modem.into();
        self
    }

    /// Liveness payload for `GET /health`.
    pub fn health(&self) -> GatewayResponse {
        debug!("health check");
        GatewayResponse::json(
            HttpStatus::Ok,
            &json!({"status": "ok", "service": "SMS Gateway API"}),
        )
    }

    /// Handles `GET /?username&password&number&text` given the raw query.
    pub async fn process_query(&self, query: &str) -> GatewayResponse {
        match SendParams::from_query(query) {
            Ok(params) => self.process_send(params).await,
            Err(e) => self.error_to_response(e),
        }
    }

    pub async fn process_send(&self, params: SendParams) -> GatewayResponse {
        let span = info_span!("sms_request", request_id = %Uuid::new_v4());
        async {
            match self.process_send_internal(params).await {
                Ok((number, report)) => Self::success_response(&number, &report),
                Err(e) => self.error_to_response(e),
            }
        }
        .instrument(span)
        .await
    }

    async fn process_send_internal(
        &self,
        params: SendParams,
    ) -> Result<(String, SendReport), GatewayError> {
        let username = required(params.username, "username")?;
        required(params.password, "password")?;
        let raw_number = required(params.number, "number")?;
        let raw_text = required(params.text, "text")?;
        info!(
            %username,
            number_len = raw_number.chars().count(),
            text_len = raw_text.chars().count(),
            "new SMS request"
        );

        let number = normalize_phone_number(&decode_url_parameter(&raw_number));
        let message = decode_url_parameter(&raw_text);
        if number != raw_number {
            debug!(from = %raw_number, to = %number, "phone number normalized");
        }

        if number.is_empty() {
            return Err(GatewayError::Validation(
                "Phone number (number) is required and must not be empty".into(),
            ));
        }
        if message.is_empty() {
            return Err(GatewayError::Validation(
                "Message (text) is required and must not be empty".into(),
            ));
        }

        let connector = self.connector.as_ref().ok_or(GatewayError::NotConfigured)?;
        let mut router = connector.connect()?;

        if !router.authenticate(false).await {
            return Err(GatewayError::AuthenticationFailed);
        }

        let modem = match router.get_modems().await {
            Some(status) => {
                info!(modems = status.data.len(), "modem list retrieved");
                status
                    .select_modem()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.fallback_modem.clone())
            }
            None => {
                warn!(fallback = %self.fallback_modem, "could not retrieve modem list");
                self.fallback_modem.clone()
            }
        };

        info!(
            %number,
            %modem,
            message_length = message.chars().count(),
            "sending SMS"
        );
        let request = SendRequest::new(&number, &message)
            .via_modem(&modem)
            .with_split(self.split);
        let report = router.send_sms(request).await?;
        Ok((number, report))
    }

    fn success_response(number: &str, report: &SendReport) -> GatewayResponse {
        info!(parts = report.parts, sms_used = report.sms_used, "SMS sent successfully");
        let mut body = json!({
            "success": true,
            "message": "SMS sent successfully",
            "sms_used": report.sms_used,
            "phone_number": number,
            "message_length": report.message_length,
        });
        if report.is_multipart() {
            body["parts"] = json!(report.parts);
            body["message"] = json!(format!("SMS sent successfully ({} parts)", report.parts));
        }
        GatewayResponse::json(HttpStatus::Ok, &body)
    }

    fn error_to_response(&self, error: GatewayError) -> GatewayResponse {
        let status = error.status();
        match &error {
            GatewayError::Validation(_) => warn!(error = %error, "rejected request"),
            _ => error!(status = status.as_u16(), error = %error, "SMS request failed"),
        }
        GatewayResponse::error(status, &error.to_string())
    }
}

/// Helper trait for framework adapters to convert responses
pub trait ResponseConverter {
    type ResponseType;

    fn from_gateway_response(response: GatewayResponse) -> Self::ResponseType;
}

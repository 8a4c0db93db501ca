//! Router auth tokens and their extraction from login responses.

use serde_json::Value;
use std::fmt;
use time::{Duration, OffsetDateTime};

/// Validity assumed when the login response does not state one.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 299;

/// Longest validity accepted from a login response or the cache.
pub const MAX_TOKEN_TTL_SECS: i64 = 86_400;

/// A token stops being used this long before it actually expires.
pub const SAFETY_MARGIN: Duration = Duration::seconds(10);

/// Bearer credential issued by the router's login endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    issued_at: OffsetDateTime,
    ttl_seconds: i64,
}

impl AuthToken {
    /// `ttl_seconds` is clamped to `0..=MAX_TOKEN_TTL_SECS`.
    pub fn new(value: impl Into<String>, ttl_seconds: i64, issued_at: OffsetDateTime) -> Self {
        Self {
            value: value.into(),
            issued_at,
            ttl_seconds: ttl_seconds.clamp(0, MAX_TOKEN_TTL_SECS),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> OffsetDateTime {
        self.issued_at
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue time plus TTL; the issue time itself if that is not representable.
    pub fn expires_at(&self) -> OffsetDateTime {
        self.issued_at
            .checked_add(Duration::seconds(self.ttl_seconds))
            .unwrap_or(self.issued_at)
    }

    /// True while `now` is more than [`SAFETY_MARGIN`] before expiry.
    pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at()
            .checked_sub(SAFETY_MARGIN)
            .is_some_and(|deadline| now < deadline)
    }

    pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
        self.expires_at() - now
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"***")
            .field("issued_at", &self.issued_at)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// What the login endpoint answered, reduced to the parts a token can hide in.
#[derive(Debug, Clone, Default)]
pub struct LoginResponse {
    pub body: Value,
    /// `(name, value)` pairs from `Set-Cookie`.
    pub cookies: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedToken {
    pub value: String,
    pub ttl_seconds: i64,
}

/// Pulls a token out of one particular response shape.
pub type TokenExtractor = fn(&LoginResponse) -> Option<ExtractedToken>;

/// Known response shapes, most specific first.
pub const TOKEN_EXTRACTORS: &[(&str, TokenExtractor)] = &[
    ("data.token", from_data_token),
    ("token", from_top_level_token),
    ("result", from_result),
    ("sysauth cookie", from_sysauth_cookie),
    ("auth cookie", from_auth_cookie),
];

/// Applies [`TOKEN_EXTRACTORS`] in order and returns the first hit together
/// with the name of the shape that matched.
pub fn extract_token(response: &LoginResponse) -> Option<(&'static str, ExtractedToken)> {
    TOKEN_EXTRACTORS
        .iter()
        .find_map(|(name, extract)| extract(response).map(|token| (*name, token)))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn ttl_from(object: &Value) -> i64 {
    let expires = object.get("expires");
    expires
        .and_then(Value::as_i64)
        .or_else(|| expires.and_then(Value::as_f64).map(|f| f as i64))
        .filter(|ttl| *ttl > 0)
        .map_or(DEFAULT_TOKEN_TTL_SECS, |ttl| ttl.min(MAX_TOKEN_TTL_SECS))
}

/// `{"success": true, "data": {"token": "...", "expires": 299}}`
fn from_data_token(response: &LoginResponse) -> Option<ExtractedToken> {
    let data = response.body.get("data").filter(|d| d.is_object())?;
    Some(ExtractedToken {
        value: non_empty_str(data.get("token"))?,
        ttl_seconds: ttl_from(data),
    })
}

/// `{"token": "...", "expires": 299}`
fn from_top_level_token(response: &LoginResponse) -> Option<ExtractedToken> {
    Some(ExtractedToken {
        value: non_empty_str(response.body.get("token"))?,
        ttl_seconds: ttl_from(&response.body),
    })
}

/// Legacy ubus style `{"result": "..."}`
fn from_result(response: &LoginResponse) -> Option<ExtractedToken> {
    Some(ExtractedToken {
        value: non_empty_str(response.body.get("result"))?,
        ttl_seconds: DEFAULT_TOKEN_TTL_SECS,
    })
}

fn from_sysauth_cookie(response: &LoginResponse) -> Option<ExtractedToken> {
    cookie_token(response, |name| name == "sysauth")
}

fn from_auth_cookie(response: &LoginResponse) -> Option<ExtractedToken> {
    cookie_token(response, |name| {
        let name = name.to_lowercase();
        name.contains("auth") || name.contains("token")
    })
}

fn cookie_token(
    response: &LoginResponse,
    matches: impl Fn(&str) -> bool,
) -> Option<ExtractedToken> {
    response
        .cookies
        .iter()
        .find(|(name, value)| matches(name) && !value.is_empty())
        .map(|(_, value)| ExtractedToken {
            value: value.clone(),
            ttl_seconds: DEFAULT_TOKEN_TTL_SECS,
        })
}

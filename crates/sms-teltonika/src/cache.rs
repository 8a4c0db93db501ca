//! Token persistence between process invocations.

use crate::token::{AuthToken, DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Storage for the router token.
///
/// A miss is not an error: callers simply log in again.
pub trait TokenStore: Send + Sync {
    /// A token that is still usable at `now`, if one is stored.
    fn load(&self, now: OffsetDateTime) -> Option<AuthToken>;

    /// Persist `token`. Failures are swallowed.
    fn save(&self, token: &AuthToken);

    /// Forget the stored token.
    fn invalidate(&self);
}

/// On-disk layout, shared with earlier tooling that reads the same file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    token: String,
    /// Unix seconds.
    expires_at: f64,
    #[serde(default)]
    expires_seconds: Option<f64>,
    /// Unix seconds.
    #[serde(default)]
    cached_at: Option<f64>,
}

fn to_unix(t: OffsetDateTime) -> f64 {
    t.unix_timestamp_nanos() as f64 / 1e9
}

fn from_unix(secs: f64) -> Option<OffsetDateTime> {
    if !secs.is_finite() {
        return None;
    }
    OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128).ok()
}

impl CacheRecord {
    fn from_token(token: &AuthToken, now: OffsetDateTime) -> Self {
        Self {
            token: token.value().to_string(),
            expires_at: to_unix(token.expires_at()),
            expires_seconds: Some(token.ttl_seconds() as f64),
            cached_at: Some(to_unix(now)),
        }
    }

    fn into_token(self) -> Option<AuthToken> {
        if self.token.is_empty() || self.expires_at <= 0.0 {
            return None;
        }
        let expires_at = from_unix(self.expires_at)?;
        let ttl = match self.expires_seconds {
            None => DEFAULT_TOKEN_TTL_SECS,
            Some(s) if s.is_finite() && (0.0..=MAX_TOKEN_TTL_SECS as f64).contains(&s) => s as i64,
            Some(_) => return None,
        };
        // issued_at + ttl must land exactly on the stored expiry.
        let issued_at = expires_at.checked_sub(Duration::seconds(ttl))?;
        Some(AuthToken::new(self.token, ttl, issued_at))
    }
}

/// JSON file in the user's home directory, one per router.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `router_url` inside `dir`, or the home directory when `None`.
    pub fn for_router(router_url: &str, dir: Option<&Path>) -> Self {
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join(cache_file_name(router_url)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, record: &CacheRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(record)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(&json)?;

        // `mode` only applies on creation.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// `.trb245_token_<host_and_path>.json` with `/` and `.` replaced by `_`.
pub fn cache_file_name(router_url: &str) -> String {
    let name = router_url
        .replace("https://", "")
        .replace("http://", "")
        .replace(['/', '.'], "_");
    format!(".trb245_token_{name}.json")
}

impl TokenStore for FileTokenStore {
    fn load(&self, now: OffsetDateTime) -> Option<AuthToken> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "ignoring unreadable token cache");
                return None;
            }
        };

        let token = record.into_token()?;
        if token.is_usable_at(now) {
            Some(token)
        } else {
            debug!(path = %self.path.display(), "cached token expired");
            self.invalidate();
            None
        }
    }

    fn save(&self, token: &AuthToken) {
        let record = CacheRecord::from_token(token, OffsetDateTime::now_utc());
        if let Err(e) = self.write(&record) {
            debug!(path = %self.path.display(), error = %e, "could not write token cache");
        }
    }

    fn invalidate(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.path.display(), error = %e, "could not remove token cache");
            }
        }
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<AuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, now: OffsetDateTime) -> Option<AuthToken> {
        let mut slot = self.slot.lock().ok()?;
        match slot.as_ref() {
            Some(token) if token.is_usable_at(now) => Some(token.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    fn save(&self, token: &AuthToken) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(token.clone());
        }
    }

    fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileTokenStore {
        FileTokenStore::for_router("https://rt-sms-01.example.local", Some(dir.path()))
    }

    #[test]
    fn file_name_is_keyed_by_router() {
        assert_eq!(
            cache_file_name("https://rt-sms-01.example.local"),
            ".trb245_token_rt-sms-01_example_local.json"
        );
        assert_ne!(
            cache_file_name("https://10.0.0.1"),
            cache_file_name("https://10.0.0.2")
        );
    }

    #[test]
    fn saved_token_loads_until_margin() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = OffsetDateTime::now_utc();
        store.save(&AuthToken::new("tok", 299, now));

        let loaded = store.load(now).expect("fresh token");
        assert_eq!(loaded.value(), "tok");
        assert_eq!(loaded.ttl_seconds(), 299);

        assert!(store.load(now + Duration::seconds(290)).is_none());
        assert!(!store.path().exists(), "expired cache is removed");
    }

    #[cfg(unix)]
    #[test]
    fn cache_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&AuthToken::new("tok", 299, OffsetDateTime::now_utc()));
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn record_layout_matches_the_documented_format() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&AuthToken::new("tok", 299, OffsetDateTime::now_utc()));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["token"], "tok");
        assert!(raw["expires_at"].is_f64());
        assert_eq!(raw["expires_seconds"], 299.0);
        assert!(raw["cached_at"].is_f64());
    }

    #[test]
    fn malformed_or_incomplete_cache_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = OffsetDateTime::now_utc();

        fs::write(store.path(), "not json").unwrap();
        assert!(store.load(now).is_none());

        fs::write(store.path(), r#"{"token": "tok"}"#).unwrap();
        assert!(store.load(now).is_none());

        fs::write(store.path(), r#"{"token": "", "expires_at": 9999999999}"#).unwrap();
        assert!(store.load(now).is_none());
    }

    #[test]
    fn implausible_lifetimes_are_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = OffsetDateTime::now_utc();
        let expires = now.unix_timestamp() + 200;

        for seconds in ["1e15", "-5", "1e400"] {
            fs::write(
                store.path(),
                format!(r#"{{"token": "tok", "expires_at": {expires}, "expires_seconds": {seconds}}}"#),
            )
            .unwrap();
            assert!(store.load(now).is_none(), "expires_seconds = {seconds}");
        }

        fs::write(store.path(), r#"{"token": "tok", "expires_at": 1e300}"#).unwrap();
        assert!(store.load(now).is_none());
    }

    #[test]
    fn integer_timestamps_are_accepted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let now = OffsetDateTime::now_utc();
        let expires = now.unix_timestamp() + 200;
        fs::write(
            store.path(),
            format!(r#"{{"token": "tok", "expires_at": {expires}}}"#),
        )
        .unwrap();
        assert_eq!(store.load(now).unwrap().value(), "tok");
    }

    #[test]
    fn missing_file_is_a_miss_and_invalidate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.load(OffsetDateTime::now_utc()).is_none());
        store.invalidate();
        store.invalidate();
    }

    #[test]
    fn memory_store_behaves_like_the_file_store() {
        let store = MemoryTokenStore::new();
        let now = OffsetDateTime::now_utc();
        assert!(store.load(now).is_none());

        store.save(&AuthToken::new("tok", 299, now));
        assert_eq!(store.load(now).unwrap().value(), "tok");
        assert!(store.load(now + Duration::seconds(295)).is_none());
        assert!(store.load(now).is_none(), "expired token was dropped");

        store.save(&AuthToken::new("tok", 299, now));
        store.invalidate();
        assert!(store.load(now).is_none());
    }
}

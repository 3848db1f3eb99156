//! Session token lifecycle and persistence
//!
//! A [`Session`] is acquired at login, attached to every authorized request and
//! cleared at logout or when the backend rejects the token. Persistence is
//! delegated to a [`TokenStore`], which keeps the token under [`TOKEN_KEY`].

use crate::types::Role;
use crate::{Result, StkPayError};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Key the session token is stored under
pub const TOKEN_KEY: &str = "token";

/// Bearer token issued by the backend
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"<redacted>").finish()
    }
}

/// Claims read from an access token without verifying its signature
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<Value>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl TokenClaims {
    /// Role carried by the token, either top-level or inside the subject
    pub fn role(&self) -> Option<Role> {
        self.role.or_else(|| {
            self.sub
                .as_ref()
                .and_then(|sub| sub.get("role"))
                .and_then(|role| serde_json::from_value(role.clone()).ok())
        })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the token's claims.
    ///
    /// The signature is not checked: the backend remains the authority, the
    /// claims only serve as hints for expiry and role.
    pub fn claims(&self) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        jsonwebtoken::decode::<TokenClaims>(&self.0, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .ok()
    }

    /// Whether the token carries an expiry that has passed.
    ///
    /// Opaque tokens without readable claims never count as expired.
    pub fn is_expired(&self) -> bool {
        self.claims()
            .and_then(|claims| claims.expires_at())
            .map(|exp| exp <= Utc::now())
            .unwrap_or(false)
    }
}

/// Persistent key/value storage for the session token
pub trait TokenStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Token store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Token store backed by a JSON object on disk
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        // The mode only applies on creation; tighten files written before.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(&serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_all()?.remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Session context shared by every authorized call
pub struct Session {
    token: RwLock<Option<AccessToken>>,
    store: Box<dyn TokenStore>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("store", &"<store>")
            .finish()
    }
}

impl Session {
    pub fn new(store: Box<dyn TokenStore>) -> Self {
        Self {
            token: RwLock::new(None),
            store,
        }
    }

    /// Session that is not persisted anywhere
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryTokenStore::new()))
    }

    /// Session persisted to a token file, restored immediately
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let session = Self::new(Box::new(FileTokenStore::new(path)));
        session.restore()?;
        Ok(session)
    }

    /// Load a previously persisted token. Returns whether one was found.
    pub fn restore(&self) -> Result<bool> {
        match self.store.load(TOKEN_KEY)? {
            Some(raw) if !raw.is_empty() => {
                debug!("Restored persisted session token");
                *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(AccessToken::new(raw));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Adopt a freshly issued token
    pub fn acquire(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        if token.is_empty() {
            return Err(StkPayError::auth("Backend issued an empty access token"));
        }
        self.store.save(TOKEN_KEY, &token)?;
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(AccessToken::new(token));
        Ok(())
    }

    /// Current usable token; expired tokens count as absent
    pub fn token(&self) -> Option<AccessToken> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().filter(|t| !t.is_expired()).cloned()
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> Result<String> {
        self.token()
            .map(|t| format!("Bearer {}", t.as_str()))
            .ok_or_else(|| StkPayError::auth("Not logged in"))
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Drop the token from memory and from the store
    pub fn clear(&self) -> Result<()> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            warn!("Failed to remove persisted session token: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn signed_token(claims: Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"backend-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_session_lifecycle() {
        let session = Session::in_memory();
        assert!(!session.is_authenticated());
        assert!(session.bearer().unwrap_err().is_auth());

        session.acquire("opaque-token").unwrap();
        assert_eq!(session.bearer().unwrap(), "Bearer opaque-token");

        session.clear().unwrap();
        assert!(session.token().is_none());
        assert!(!session.restore().unwrap());
    }

    #[test]
    fn test_empty_token_rejected() {
        let session = Session::in_memory();
        assert!(session.acquire("").is_err());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_claims_decode_without_secret() {
        let exp = Utc::now().timestamp() + 3600;
        let token = AccessToken::new(signed_token(json!({
            "sub": { "id": 7, "role": "admin" },
            "exp": exp
        })));

        let claims = token.claims().unwrap();
        assert_eq!(claims.role(), Some(Role::Admin));
        assert_eq!(claims.expires_at().unwrap().timestamp(), exp);
        assert!(!token.is_expired());
    }

    #[test]
    fn test_expired_token_counts_as_absent() {
        let session = Session::in_memory();
        let token = signed_token(json!({
            "sub": { "id": 1, "role": "business" },
            "exp": Utc::now().timestamp() - 60
        }));
        session.acquire(token).unwrap();
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_file_store_persists_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let first = Session::from_file(&path).unwrap();
        assert!(!first.is_authenticated());
        first.acquire("persisted-token").unwrap();

        let second = Session::from_file(&path).unwrap();
        assert_eq!(second.token().unwrap().as_str(), "persisted-token");

        second.clear().unwrap();
        let third = Session::from_file(&path).unwrap();
        assert!(!third.is_authenticated());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileTokenStore::new(&path);
        store.save(TOKEN_KEY, "secret-token").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load(TOKEN_KEY).unwrap().as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("super-secret");
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}

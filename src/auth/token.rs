use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::error::{AuthError, AuthResult};

/// Seconds before the real expiry at which a token is treated as expired
const EARLY_RENEWAL_MARGIN_SECS: i64 = 300;

/// OAuth2 access token plus the refresh token that came with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub created_at: i64,
}

impl AccessToken {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        token_type: String,
        expires_in: Option<u64>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            created_at: Utc::now().timestamp(),
        }
    }

    /// Bearer token without refresh token or known lifetime
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::new(access_token.into(), None, "Bearer".to_string(), None)
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    /// Expired, or within five minutes of expiring
    pub fn is_expired(&self) -> bool {
        match self.expires_in {
            Some(expires_in) => {
                let expiry = self.created_at + expires_in as i64 - EARLY_RENEWAL_MARGIN_SECS;
                Utc::now().timestamp() >= expiry
            }
            None => false,
        }
    }

    /// Seconds left until the real expiry, if the lifetime is known
    pub fn time_to_expiry(&self) -> Option<u64> {
        self.expires_in.map(|expires_in| {
            let expiry = self.created_at + expires_in as i64;
            (expiry - Utc::now().timestamp()).max(0) as u64
        })
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// First and last characters only, for logs and CLI output
    pub fn preview(&self) -> String {
        let chars: Vec<char> = self.access_token.chars().collect();
        if chars.len() <= 8 {
            return "****".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl From<TokenResponse> for AccessToken {
    fn from(response: TokenResponse) -> Self {
        Self::new(
            response.access_token,
            response.refresh_token,
            response.token_type,
            response.expires_in,
        )
    }
}

/// Persistent home for the last token pair, so a later run can skip consent
pub trait TokenStore: Send + Sync {
    /// Returns the stored token, or `None` when nothing usable is stored
    fn load(&self) -> AuthResult<Option<AccessToken>>;

    fn save(&self, token: &AccessToken) -> AuthResult<()>;

    fn clear(&self) -> AuthResult<()>;
}

/// JSON file token store
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> AuthResult<Option<AccessToken>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        let token: AccessToken = match serde_json::from_str(&contents) {
            Ok(token) => token,
            Err(e) => {
                log::warn!("⚠️ Ignoring unreadable token file {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        Ok(Some(token).filter(AccessToken::has_access_token))
    }

    fn save(&self, token: &AccessToken) -> AuthResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(token)?;
        fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        log::info!("💾 Token saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> AuthResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("🗑️ Token removed from {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::from(e)),
        }
    }
}

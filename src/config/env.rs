use dotenv::dotenv;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use crate::error::{AuthError, AuthResult};

pub const DEFAULT_CALLBACK_PORT: u16 = 5000;
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TOKEN_STORE_PATH: &str = ".oauth.json";
pub const DEFAULT_API_BASE_URL: &str = "https://api.box.com/2.0";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://account.box.com/api/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.box.com/oauth2/token";

/// Process-wide settings read from the environment.
///
/// Built once at startup and handed by reference to whatever needs it. Values
/// that only some strategies need stay optional here; each strategy checks
/// its own requirements through the `require_*` accessors.
#[derive(Clone)]
pub struct Settings {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<Url>,
    callback_hostname: Option<String>,
    callback_port: u16,
    callback_timeout: Duration,
    enterprise_id: Option<String>,
    ccg_user_id: Option<String>,
    jwt_config_path: Option<PathBuf>,
    token_store_path: PathBuf,
    api_base_url: Url,
    authorize_url: Url,
    token_url: Url,
}

impl Settings {
    /// Loads `.env` (outside tests) and reads the process environment
    pub fn from_env() -> AuthResult<Self> {
        if cfg!(not(test)) && Path::new(".env").exists() {
            dotenv().map_err(|e| AuthError::config_error(format!("Failed to load .env: {}", e)))?;
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    ///
    /// Empty values count as absent. Only syntactically invalid values fail.
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let callback_port = match get("CALLBACK_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                AuthError::config_error(format!("CALLBACK_PORT must be a port number, got '{}'", raw))
            })?,
            None => DEFAULT_CALLBACK_PORT,
        };

        let callback_timeout = match get("CALLBACK_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                AuthError::config_error(format!(
                    "CALLBACK_TIMEOUT_SECS must be a number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
        };

        let redirect_uri = get("REDIRECT_URI")
            .map(|raw| parse_url("REDIRECT_URI", &raw))
            .transpose()?;

        let api_base_url = parse_url(
            "BOX_API_BASE_URL",
            &get("BOX_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        )?;
        let authorize_url = parse_url(
            "BOX_AUTHORIZE_URL",
            &get("BOX_AUTHORIZE_URL").unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
        )?;
        let token_url = parse_url(
            "BOX_TOKEN_URL",
            &get("BOX_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        )?;

        Ok(Self {
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET"),
            redirect_uri,
            callback_hostname: get("CALLBACK_HOSTNAME"),
            callback_port,
            callback_timeout,
            enterprise_id: get("ENTERPRISE_ID"),
            ccg_user_id: get("CCG_USER_ID"),
            jwt_config_path: get("JWT_CONFIG_PATH").map(PathBuf::from),
            token_store_path: get("TOKEN_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_STORE_PATH)),
            api_base_url,
            authorize_url,
            token_url,
        })
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn redirect_uri(&self) -> Option<&Url> {
        self.redirect_uri.as_ref()
    }

    pub fn callback_hostname(&self) -> Option<&str> {
        self.callback_hostname.as_deref()
    }

    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    pub fn callback_timeout(&self) -> Duration {
        self.callback_timeout
    }

    pub fn enterprise_id(&self) -> Option<&str> {
        self.enterprise_id.as_deref()
    }

    pub fn ccg_user_id(&self) -> Option<&str> {
        self.ccg_user_id.as_deref()
    }

    pub fn jwt_config_path(&self) -> Option<&Path> {
        self.jwt_config_path.as_deref()
    }

    pub fn token_store_path(&self) -> &Path {
        &self.token_store_path
    }

    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn require_client_id(&self) -> AuthResult<&str> {
        required("CLIENT_ID", self.client_id())
    }

    pub fn require_client_secret(&self) -> AuthResult<&str> {
        required("CLIENT_SECRET", self.client_secret())
    }

    pub fn require_redirect_uri(&self) -> AuthResult<&Url> {
        self.redirect_uri()
            .ok_or_else(|| AuthError::config_error("REDIRECT_URI is required for this strategy"))
    }

    pub fn require_callback_hostname(&self) -> AuthResult<&str> {
        required("CALLBACK_HOSTNAME", self.callback_hostname())
    }

    pub fn require_enterprise_id(&self) -> AuthResult<&str> {
        required("ENTERPRISE_ID", self.enterprise_id())
    }

    pub fn require_ccg_user_id(&self) -> AuthResult<&str> {
        required("CCG_USER_ID", self.ccg_user_id())
    }

    pub fn require_jwt_config_path(&self) -> AuthResult<&Path> {
        self.jwt_config_path()
            .ok_or_else(|| AuthError::config_error("JWT_CONFIG_PATH is required for this strategy"))
    }

    /// Short summary for log output, without secrets
    pub fn environment_info(&self) -> String {
        format!(
            "callback: {}:{}, redirect: {}, token store: {}",
            self.callback_hostname().unwrap_or("<unset>"),
            self.callback_port,
            self.redirect_uri().map(Url::as_str).unwrap_or("<unset>"),
            self.token_store_path.display()
        )
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri.as_ref().map(Url::as_str))
            .field("callback_hostname", &self.callback_hostname)
            .field("callback_port", &self.callback_port)
            .field("callback_timeout", &self.callback_timeout)
            .field("enterprise_id", &self.enterprise_id)
            .field("ccg_user_id", &self.ccg_user_id)
            .field("jwt_config_path", &self.jwt_config_path)
            .field("token_store_path", &self.token_store_path)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .finish()
    }
}

fn required<'a>(key: &str, value: Option<&'a str>) -> AuthResult<&'a str> {
    value.ok_or_else(|| AuthError::config_error(format!("{} is required for this strategy", key)))
}

fn parse_url(key: &str, raw: &str) -> AuthResult<Url> {
    Url::parse(raw).map_err(|e| AuthError::config_error(format!("{} is not a valid URL ({}): {}", key, e, raw)))
}

//! Server authentication with a signed JWT assertion.
//!
//! Box app configs ship as a JSON file holding the app credentials, the RSA
//! private key (usually passphrase-encrypted PKCS#8) and the enterprise id.
//! The assertion is exchanged for a token without any user interaction.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use crate::auth::session::{Grant, Session, Subject};
use crate::client::endpoint::BoxOAuthClient;
use crate::config::Settings;
use crate::error::{AuthError, AuthResult};

/// Box rejects assertions that live longer than 60 seconds
const ASSERTION_LIFETIME_SECS: i64 = 45;

/// Box JSON app configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(rename = "boxAppSettings")]
    pub app_settings: BoxAppSettings,
    #[serde(rename = "enterpriseID", default, deserialize_with = "string_or_number")]
    pub enterprise_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxAppSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(rename = "appAuth")]
    pub app_auth: AppAuth,
}

#[derive(Clone, Deserialize)]
pub struct AppAuth {
    #[serde(rename = "publicKeyID")]
    pub public_key_id: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl std::fmt::Debug for AppAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuth")
            .field("public_key_id", &self.public_key_id)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(id)) if !id.is_empty() => Some(id),
        Some(Raw::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

impl JwtConfig {
    pub fn from_file(path: &Path) -> AuthResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            AuthError::config_error(format!("Cannot read JWT config {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    box_sub_type: &'a str,
    aud: &'a str,
    jti: String,
    exp: i64,
}

/// Turns the PEM from the app config into a signing key
pub fn load_signing_key(private_key: &str, passphrase: Option<&str>) -> AuthResult<EncodingKey> {
    // Keys pasted into env files often carry literal "\n"
    let pem = private_key.replace("\\n", "\n");

    let key = if pem.contains("BEGIN ENCRYPTED PRIVATE KEY") {
        let passphrase = passphrase
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AuthError::key_error("Encrypted private key needs a passphrase"))?;
        RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase.as_bytes())
            .map_err(|e| AuthError::key_error(format!("Cannot decrypt private key: {}", e)))?
    } else if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(&pem)
            .map_err(|e| AuthError::key_error(format!("Invalid PKCS#1 private key: {}", e)))?
    } else {
        RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| AuthError::key_error(format!("Invalid PKCS#8 private key: {}", e)))?
    };

    let der = key
        .to_pkcs1_der()
        .map_err(|e| AuthError::key_error(format!("Cannot encode private key: {}", e)))?;
    Ok(EncodingKey::from_rsa_der(der.as_bytes()))
}

/// JWT grant for a Box app
pub struct JwtAuth<'a> {
    settings: &'a Settings,
    config: JwtConfig,
    signing_key: EncodingKey,
}

impl<'a> JwtAuth<'a> {
    /// Reads and validates the app config at `JWT_CONFIG_PATH`
    pub fn from_settings(settings: &'a Settings) -> AuthResult<Self> {
        let path = settings.require_jwt_config_path()?;
        Self::new(settings, JwtConfig::from_file(path)?)
    }

    pub fn new(settings: &'a Settings, config: JwtConfig) -> AuthResult<Self> {
        let app_auth = &config.app_settings.app_auth;
        let signing_key = load_signing_key(&app_auth.private_key, app_auth.passphrase.as_deref())?;

        Ok(Self {
            settings,
            config,
            signing_key,
        })
    }

    /// Enterprise from the app config, or `ENTERPRISE_ID` when the config has none
    pub fn enterprise_subject(&self) -> AuthResult<Subject> {
        self.config
            .enterprise_id
            .clone()
            .or_else(|| self.settings.enterprise_id().map(str::to_string))
            .map(Subject::Enterprise)
            .ok_or_else(|| AuthError::config_error("JWT config has no enterpriseID and ENTERPRISE_ID is unset"))
    }

    /// Signed RS256 assertion for `subject`
    pub fn assertion(&self, subject: &Subject) -> AuthResult<String> {
        let app = &self.config.app_settings;
        let audience = self.settings.token_url().as_str();

        let claims = Claims {
            iss: &app.client_id,
            sub: subject.id(),
            box_sub_type: subject.subject_type(),
            aud: audience,
            jti: uuid::Uuid::new_v4().simple().to_string(),
            exp: Utc::now().timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(app.app_auth.public_key_id.clone());

        encode(&header, &claims, &self.signing_key)
            .map_err(|e| AuthError::key_error(format!("Failed to sign JWT assertion: {}", e)))
    }

    /// Enterprise session, optionally acting as `as_user`
    pub async fn authenticate(&self, as_user: Option<&str>) -> AuthResult<Session> {
        let subject = self.enterprise_subject()?;
        self.authenticate_subject(subject, as_user).await
    }

    pub async fn authenticate_subject(&self, subject: Subject, as_user: Option<&str>) -> AuthResult<Session> {
        log::info!("🔑 Authenticating with JWT as {}...", subject);

        let app = &self.config.app_settings;
        let oauth = BoxOAuthClient::with_credentials(self.settings, &app.client_id, &app.client_secret)?;
        let assertion = self.assertion(&subject)?;
        let token = oauth.jwt_bearer(&assertion).await?;

        if !token.has_access_token() {
            return Err(AuthError::authentication("JWT grant returned no access token"));
        }

        log::info!("✅ JWT session ready");
        let session = Session::new(token, Grant::Jwt(subject));
        Ok(match as_user {
            Some(user_id) => session.as_user(user_id),
            None => session,
        })
    }
}

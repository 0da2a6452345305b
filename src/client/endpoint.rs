use oauth2::{
    basic::{BasicClient, BasicTokenResponse},
    reqwest::async_http_client,
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl,
    RefreshToken, TokenResponse as _, TokenUrl,
};
use serde::Deserialize;
use url::Url;
use crate::auth::session::Subject;
use crate::auth::token::{AccessToken, TokenResponse};
use crate::config::Settings;
use crate::error::{AuthError, AuthResult};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// OAuth2 error body returned by the token endpoint
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for Box's OAuth2 authorize and token endpoints
#[derive(Debug, Clone)]
pub struct BoxOAuthClient {
    oauth: BasicClient,
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl BoxOAuthClient {
    /// Uses `CLIENT_ID`/`CLIENT_SECRET` from the settings
    pub fn new(settings: &Settings) -> AuthResult<Self> {
        let client_id = settings.require_client_id()?.to_string();
        let client_secret = settings.require_client_secret()?.to_string();
        Self::with_credentials(settings, client_id, client_secret)
    }

    /// Uses explicit app credentials (the JWT config file carries its own)
    pub fn with_credentials(
        settings: &Settings,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> AuthResult<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        let auth_url = AuthUrl::new(settings.authorize_url().to_string())
            .map_err(|e| AuthError::config_error(format!("Invalid authorize URL: {}", e)))?;
        let token_url = TokenUrl::new(settings.token_url().to_string())
            .map_err(|e| AuthError::config_error(format!("Invalid token URL: {}", e)))?;

        let mut oauth = BasicClient::new(
            ClientId::new(client_id.clone()),
            Some(ClientSecret::new(client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        if let Some(redirect_uri) = settings.redirect_uri() {
            let redirect_url = RedirectUrl::new(redirect_uri.to_string())
                .map_err(|e| AuthError::config_error(format!("Invalid redirect URI: {}", e)))?;
            oauth = oauth.set_redirect_uri(redirect_url);
        }

        Ok(Self {
            oauth,
            http: reqwest::Client::new(),
            token_url: settings.token_url().clone(),
            client_id,
            client_secret,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Consent page URL carrying `state` as the CSRF token
    pub fn authorize_url(&self, state: &str) -> Url {
        let state = state.to_string();
        let (url, _) = self.oauth.authorize_url(move || CsrfToken::new(state)).url();
        url
    }

    /// Trades an authorization code for a token pair
    pub async fn exchange_code(&self, code: &str) -> AuthResult<AccessToken> {
        log::info!("🔄 Exchanging authorization code for a token...");

        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::authentication(format!("Code exchange failed: {}", e)))?;

        Ok(to_access_token(&response))
    }

    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<AccessToken> {
        log::info!("🔄 Refreshing access token...");

        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::authentication(format!("Token refresh failed: {}", e)))?;

        let mut token = to_access_token(&response);
        // Box rotates refresh tokens, but keep the old one if none came back
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// Client-credentials grant for an enterprise or a user
    pub async fn client_credentials(&self, subject: &Subject) -> AuthResult<AccessToken> {
        log::info!("🔑 Requesting client-credentials token for {}", subject);

        let response = self
            .oauth
            .exchange_client_credentials()
            .add_extra_param("box_subject_type", subject.subject_type())
            .add_extra_param("box_subject_id", subject.id().to_string())
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::authentication(format!("Client-credentials grant failed: {}", e)))?;

        Ok(to_access_token(&response))
    }

    /// JWT-bearer grant with a signed assertion
    pub async fn jwt_bearer(&self, assertion: &str) -> AuthResult<AccessToken> {
        log::info!("🔑 Requesting JWT-bearer token...");

        let params = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(AuthError::authentication(format!(
                "JWT grant failed [{}]: {}",
                status.as_u16(),
                message
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(token_response.into())
    }
}

fn to_access_token(response: &BasicTokenResponse) -> AccessToken {
    AccessToken::new(
        response.access_token().secret().clone(),
        response.refresh_token().map(|t| t.secret().clone()),
        "bearer".to_string(),
        response.expires_in().map(|d| d.as_secs()),
    )
}

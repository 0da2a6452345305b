use std::sync::atomic::{AtomicU8, Ordering};
use url::Url;
use crate::auth::callback::{CallbackServer, PendingAuthorization};
use crate::auth::session::{Grant, Session};
use crate::auth::token::{AccessToken, FileTokenStore, TokenStore};
use crate::client::endpoint::BoxOAuthClient;
use crate::config::Settings;
use crate::error::{AuthError, AuthResult};

/// Hands the consent URL to the operator
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &Url) -> AuthResult<()>;
}

/// Opens the system default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &Url) -> AuthResult<()> {
        webbrowser::open(url.as_str()).map_err(|e| AuthError::browser_error(e.to_string()))
    }
}

/// Progress of one authorization-code run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlowState {
    Start,
    NoToken,
    AwaitingCallback,
    Exchanging,
    Authenticated,
    Failed,
}

impl FlowState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => FlowState::Start,
            1 => FlowState::NoToken,
            2 => FlowState::AwaitingCallback,
            3 => FlowState::Exchanging,
            4 => FlowState::Authenticated,
            _ => FlowState::Failed,
        }
    }
}

/// OAuth2 authorization-code flow with a local callback listener
pub struct AuthorizationCodeFlow<'a> {
    settings: &'a Settings,
    store: Box<dyn TokenStore>,
    browser: Box<dyn BrowserOpener>,
    state: AtomicU8,
}

impl<'a> AuthorizationCodeFlow<'a> {
    /// Persists tokens to `TOKEN_STORE_PATH` and opens the system browser
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            store: Box::new(FileTokenStore::new(settings.token_store_path())),
            browser: Box::new(SystemBrowser),
            state: AtomicU8::new(FlowState::Start as u8),
        }
    }

    pub fn with_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_browser(mut self, browser: impl BrowserOpener + 'static) -> Self {
        self.browser = Box::new(browser);
        self
    }

    /// State reached by the last run
    pub fn state(&self) -> FlowState {
        FlowState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, next: FlowState) {
        let previous = FlowState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        log::debug!("Authorization flow: {:?} -> {:?}", previous, next);
    }

    /// Runs the flow: reuse the stored token, or ask for consent
    pub async fn authenticate(&self) -> AuthResult<Session> {
        log::info!("🔑 Starting OAuth2 authorization-code authentication...");
        log::info!("📍 {}", self.settings.environment_info());
        self.transition(FlowState::Start);

        match self.run().await {
            Ok(token) => {
                self.transition(FlowState::Authenticated);
                log::info!("✅ Authenticated (token {})", token.preview());
                Ok(Session::new(token, Grant::AuthorizationCode))
            }
            Err(e) => {
                self.transition(FlowState::Failed);
                log::error!("❌ Authorization failed: {}", e);
                Err(e)
            }
        }
    }

    /// Drops the stored token and goes through consent again
    pub async fn force_reauth(&self) -> AuthResult<Session> {
        log::info!("🔄 Forcing re-authorization...");
        self.store.clear()?;
        self.authenticate().await
    }

    /// Removes the stored token
    pub fn logout(&self) -> AuthResult<()> {
        self.store.clear()
    }

    pub fn current_token(&self) -> AuthResult<Option<AccessToken>> {
        self.store.load()
    }

    async fn run(&self) -> AuthResult<AccessToken> {
        let oauth = BoxOAuthClient::new(self.settings)?;

        // A persisted token never leads to a listener; re-consent is explicit (force_reauth)
        if let Some(token) = self.store.load()? {
            log::info!("🔍 Stored token found, skipping consent");
            return self.refresh_once(&oauth, token).await.map_err(|e| {
                log::warn!("⚠️ Stored token is unusable, run again with --force to re-authorize");
                match e {
                    AuthError::Authentication(_) | AuthError::TokenExpired => e,
                    other => AuthError::authentication(format!("Stored token could not be refreshed: {}", other)),
                }
            });
        }

        self.transition(FlowState::NoToken);
        let token = self.obtain_with_consent(&oauth).await?;
        self.refresh_once(&oauth, token).await
    }

    async fn obtain_with_consent(&self, oauth: &BoxOAuthClient) -> AuthResult<AccessToken> {
        self.settings.require_redirect_uri()?;
        let server = CallbackServer::from_settings(self.settings)?;

        let pending = PendingAuthorization::new();
        let auth_url = oauth.authorize_url(pending.state());
        let listener = server.bind(pending)?;
        self.transition(FlowState::AwaitingCallback);

        if let Err(e) = self.browser.open(&auth_url) {
            log::warn!("⚠️ Could not open the browser automatically: {}", e);
            log::info!("🔗 Open this link manually: {}", auth_url);
        } else {
            log::info!("🌐 Browser opened, waiting for authorization...");
        }

        let callback = listener.wait(self.settings.callback_timeout()).await?;

        self.transition(FlowState::Exchanging);
        let token = oauth.exchange_code(&callback.code).await?;
        if !token.has_access_token() {
            return Err(AuthError::authentication("Token endpoint returned no access token"));
        }

        self.store.save(&token)?;
        Ok(token)
    }

    /// Refreshes once before first use when a refresh token is available
    async fn refresh_once(&self, oauth: &BoxOAuthClient, token: AccessToken) -> AuthResult<AccessToken> {
        let Some(refresh_token) = token.refresh_token.clone() else {
            if token.is_expired() {
                return Err(AuthError::TokenExpired);
            }
            log::debug!("No refresh token stored, using access token as is");
            return Ok(token);
        };

        let refreshed = oauth.refresh(&refresh_token).await?;
        if !refreshed.has_access_token() {
            return Err(AuthError::authentication("Refresh returned no access token"));
        }

        self.store.save(&refreshed)?;
        Ok(refreshed)
    }
}

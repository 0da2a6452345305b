use crate::auth::ccg::ClientCredentialsAuth;
use crate::auth::jwt::JwtAuth;
use crate::auth::oauth::AuthorizationCodeFlow;
use crate::auth::session::{Session, Subject};
use crate::config::Settings;
use crate::error::AuthResult;

/// Which grant to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Browser consent with a local callback; `force` discards the stored token
    AuthorizationCode { force: bool },
    /// Box app JWT config, optionally acting as a user
    Jwt { as_user: Option<String> },
    /// Client credentials for an enterprise or user, optionally acting as a user
    ClientCredentials {
        subject: Subject,
        as_user: Option<String>,
    },
}

/// Entry point that turns [`Settings`] and a [`Strategy`] into a [`Session`]
#[derive(Debug, Clone, Copy)]
pub struct AuthBroker<'a> {
    settings: &'a Settings,
}

impl<'a> AuthBroker<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    pub async fn authenticate(&self, strategy: Strategy) -> AuthResult<Session> {
        match strategy {
            Strategy::AuthorizationCode { force } => {
                let flow = AuthorizationCodeFlow::new(self.settings);
                if force {
                    flow.force_reauth().await
                } else {
                    flow.authenticate().await
                }
            }
            Strategy::Jwt { as_user } => {
                JwtAuth::from_settings(self.settings)?
                    .authenticate(as_user.as_deref())
                    .await
            }
            Strategy::ClientCredentials { subject, as_user } => {
                ClientCredentialsAuth::new(self.settings, subject)
                    .authenticate(as_user.as_deref())
                    .await
            }
        }
    }

    /// Client-credentials session for `ENTERPRISE_ID`
    pub async fn ccg_enterprise(&self, as_user: Option<&str>) -> AuthResult<Session> {
        ClientCredentialsAuth::enterprise(self.settings)?
            .authenticate(as_user)
            .await
    }

    /// Client-credentials session for `CCG_USER_ID`
    pub async fn ccg_user(&self, as_user: Option<&str>) -> AuthResult<Session> {
        ClientCredentialsAuth::user(self.settings)?
            .authenticate(as_user)
            .await
    }
}

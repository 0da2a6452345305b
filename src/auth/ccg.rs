use crate::auth::session::{Grant, Session, Subject};
use crate::client::endpoint::BoxOAuthClient;
use crate::config::Settings;
use crate::error::{AuthError, AuthResult};

/// Client-credentials grant, authenticating as the app's service account
/// for an enterprise or as a specific managed user.
pub struct ClientCredentialsAuth<'a> {
    settings: &'a Settings,
    subject: Subject,
}

impl<'a> ClientCredentialsAuth<'a> {
    pub fn new(settings: &'a Settings, subject: Subject) -> Self {
        Self { settings, subject }
    }

    /// Service account of `ENTERPRISE_ID`
    pub fn enterprise(settings: &'a Settings) -> AuthResult<Self> {
        let enterprise_id = settings.require_enterprise_id()?;
        Ok(Self::new(settings, Subject::Enterprise(enterprise_id.to_string())))
    }

    /// The user in `CCG_USER_ID`
    pub fn user(settings: &'a Settings) -> AuthResult<Self> {
        let user_id = settings.require_ccg_user_id()?;
        Ok(Self::new(settings, Subject::User(user_id.to_string())))
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub async fn authenticate(&self, as_user: Option<&str>) -> AuthResult<Session> {
        let oauth = BoxOAuthClient::new(self.settings)?;
        let token = oauth.client_credentials(&self.subject).await?;

        if !token.has_access_token() {
            return Err(AuthError::authentication("Client-credentials grant returned no access token"));
        }

        log::info!("✅ Client-credentials session ready for {}", self.subject);
        let session = Session::new(token, Grant::ClientCredentials(self.subject.clone()));
        Ok(match as_user {
            Some(user_id) => session.as_user(user_id),
            None => session,
        })
    }
}

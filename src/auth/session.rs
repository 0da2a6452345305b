use std::fmt;
use crate::auth::token::AccessToken;

/// Identity a JWT or client-credentials grant authenticates as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Enterprise(String),
    User(String),
}

impl Subject {
    /// Value of Box's `box_subject_type` / `box_sub_type` parameter
    pub fn subject_type(&self) -> &'static str {
        match self {
            Subject::Enterprise(_) => "enterprise",
            Subject::User(_) => "user",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Subject::Enterprise(id) | Subject::User(id) => id,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.subject_type(), self.id())
    }
}

/// Grant that produced a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode,
    Jwt(Subject),
    ClientCredentials(Subject),
}

/// Authenticated session, ready to be handed to [`crate::client::BoxClient`]
#[derive(Debug, Clone)]
pub struct Session {
    token: AccessToken,
    grant: Grant,
    as_user: Option<String>,
}

impl Session {
    pub fn new(token: AccessToken, grant: Grant) -> Self {
        Self {
            token,
            grant,
            as_user: None,
        }
    }

    /// Same session acting on behalf of another user (`As-User` header)
    pub fn as_user(mut self, user_id: impl Into<String>) -> Self {
        self.as_user = Some(user_id.into());
        self
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn grant(&self) -> &Grant {
        &self.grant
    }

    pub fn impersonated_user(&self) -> Option<&str> {
        self.as_user.as_deref()
    }
}

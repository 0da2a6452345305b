use reqwest::{Client, header::{HeaderMap, HeaderValue, AUTHORIZATION}, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;
use crate::auth::session::Session;
use crate::error::{AuthError, AuthResult};

/// Outcome of a create call that may collide with an existing item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome<T> {
    Created(T),
    /// An item with the same name already exists; carries its id
    AlreadyExists(String),
}

impl<T> CreateOutcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// `GET /users/me` response, trimmed to what the demos print
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

/// Box error body
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    context_info: Option<Value>,
}

/// Thin HTTP client for the Box REST API
#[derive(Debug, Clone)]
pub struct BoxClient {
    client: Client,
    base_url: Url,
}

impl BoxClient {
    pub fn new(session: &Session, base_url: &Url) -> AuthResult<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&session.token().authorization_header())
            .map_err(|_| AuthError::authentication("Access token is not a valid header value"))?;
        headers.insert(AUTHORIZATION, bearer);

        if let Some(user_id) = session.impersonated_user() {
            let as_user = HeaderValue::from_str(user_id)
                .map_err(|_| AuthError::config_error(format!("Invalid As-User id: {}", user_id)))?;
            headers.insert("As-User", as_user);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    pub async fn current_user(&self) -> AuthResult<User> {
        let response = self.client.get(self.url("users/me")).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    pub async fn get_folder(&self, folder_id: &str) -> AuthResult<Folder> {
        let response = self
            .client
            .get(self.url(&format!("folders/{}", folder_id)))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Creates a folder, reporting a name clash as `AlreadyExists`
    pub async fn create_folder(&self, parent_id: &str, name: &str) -> AuthResult<CreateOutcome<Folder>> {
        let body = json!({
            "name": name,
            "parent": { "id": parent_id }
        });

        let response = self.client.post(self.url("folders")).json(&body).send().await?;

        if response.status().as_u16() == 409 {
            let error = read_error(response).await;
            return match error.conflict_id {
                Some(id) => {
                    log::warn!("📁 Folder '{}' already exists ({})", name, id);
                    Ok(CreateOutcome::AlreadyExists(id))
                }
                None => Err(error.into_auth_error()),
            };
        }

        let response = check_status(response).await?;
        Ok(CreateOutcome::Created(response.json().await?))
    }
}

struct ApiError {
    status: u16,
    code: String,
    message: String,
    conflict_id: Option<String>,
}

impl ApiError {
    fn into_auth_error(self) -> AuthError {
        AuthError::api_error(self.status, self.code, self.message)
    }
}

async fn check_status(response: Response) -> AuthResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(read_error(response).await.into_auth_error())
    }
}

async fn read_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => ApiError {
            status,
            code: body.code.unwrap_or_else(|| "unknown".to_string()),
            message: body.message.unwrap_or_default(),
            conflict_id: body.context_info.as_ref().and_then(conflict_id),
        },
        Err(_) => ApiError {
            status,
            code: "unknown".to_string(),
            message: text,
            conflict_id: None,
        },
    }
}

/// `context_info.conflicts` is a list for folders and an object for files
fn conflict_id(context_info: &Value) -> Option<String> {
    let conflicts = context_info.get("conflicts")?;
    let conflict = match conflicts {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match conflict.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

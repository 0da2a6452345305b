use std::collections::HashMap;
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};

use box_oauth::auth::{
    AccessToken, AuthorizationCodeFlow, BrowserOpener, FileTokenStore, FlowState, TokenStore,
};
use box_oauth::{AuthError, AuthResult, Settings};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Plays the operator: follows the consent URL straight to the redirect
#[derive(Clone)]
struct ConsentingBrowser {
    code: String,
    forced_state: Option<String>,
    opened: Arc<Mutex<Vec<Url>>>,
}

impl ConsentingBrowser {
    fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            forced_state: None,
            opened: Arc::default(),
        }
    }

    fn with_state(mut self, state: &str) -> Self {
        self.forced_state = Some(state.to_string());
        self
    }

    fn issued_state(&self) -> Option<String> {
        let opened = self.opened.lock().unwrap();
        let url = opened.first()?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        params.get("state").cloned()
    }
}

impl BrowserOpener for ConsentingBrowser {
    fn open(&self, url: &Url) -> AuthResult<()> {
        self.opened.lock().unwrap().push(url.clone());

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let mut redirect = Url::parse(&params["redirect_uri"]).unwrap();
        let state = self.forced_state.clone().unwrap_or_else(|| params["state"].clone());
        redirect
            .query_pairs_mut()
            .append_pair("state", &state)
            .append_pair("code", &self.code);

        tokio::spawn(async move {
            let _ = reqwest::get(redirect).await;
        });
        Ok(())
    }
}

/// Operator who never completes consent
#[derive(Clone, Default)]
struct IdleBrowser {
    opened: Arc<Mutex<Vec<Url>>>,
}

impl BrowserOpener for IdleBrowser {
    fn open(&self, url: &Url) -> AuthResult<()> {
        self.opened.lock().unwrap().push(url.clone());
        Ok(())
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn settings(token_server: &MockServer, port: u16, store: &Path, timeout_secs: u64) -> Settings {
    let vars: HashMap<String, String> = [
        ("CLIENT_ID", "workshop_client".to_string()),
        ("CLIENT_SECRET", "workshop_secret".to_string()),
        ("REDIRECT_URI", format!("http://127.0.0.1:{}/callback", port)),
        ("CALLBACK_HOSTNAME", "127.0.0.1".to_string()),
        ("CALLBACK_PORT", port.to_string()),
        ("CALLBACK_TIMEOUT_SECS", timeout_secs.to_string()),
        ("BOX_TOKEN_URL", format!("{}/oauth2/token", token_server.uri())),
        ("TOKEN_STORE_PATH", store.display().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 3600
    })
}

async fn mount_code_exchange(server: &MockServer, code: &str, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={}", code)))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh)))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_refresh(server: &MockServer, old_refresh: &str, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={}", old_refresh)))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh)))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_no_token_calls(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn matching_callback_exchanges_code_and_authenticates() {
    let server = MockServer::start().await;
    mount_code_exchange(&server, "ABC", "access-1", "refresh-1").await;
    mount_refresh(&server, "refresh-1", "access-2", "refresh-2").await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let settings = settings(&server, free_port(), &store_path, 10);
    let browser = ConsentingBrowser::new("ABC");

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(browser.clone());

    let session = flow.authenticate().await.unwrap();

    assert_eq!(flow.state(), FlowState::Authenticated);
    assert_eq!(session.token().access_token, "access-2");
    assert!(browser.issued_state().is_some());

    let stored = FileTokenStore::new(&store_path).load().unwrap().unwrap();
    assert_eq!(stored.access_token, "access-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn mismatched_state_fails_without_exchange() {
    let server = MockServer::start().await;
    mount_no_token_calls(&server).await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let port = free_port();
    let settings = settings(&server, port, &store_path, 10);

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(ConsentingBrowser::new("ABC").with_state("WRONG"));

    let err = flow.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidState));
    assert_eq!(flow.state(), FlowState::Failed);
    assert!(FileTokenStore::new(&store_path).load().unwrap().is_none());

    // Listener released on the failure path too
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn persisted_token_skips_listener_and_consent() {
    let server = MockServer::start().await;
    mount_refresh(&server, "refresh-saved", "access-fresh", "refresh-fresh").await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    FileTokenStore::new(&store_path)
        .save(&AccessToken::new(
            "access-saved".to_string(),
            Some("refresh-saved".to_string()),
            "bearer".to_string(),
            Some(3600),
        ))
        .unwrap();

    // Hold the callback port: any attempt to listen would fail
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let settings = settings(&server, port, &store_path, 10);
    let browser = IdleBrowser::default();

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(browser.clone());

    let session = flow.authenticate().await.unwrap();

    assert_eq!(flow.state(), FlowState::Authenticated);
    assert_eq!(session.token().access_token, "access-fresh");
    assert!(browser.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tokens_survive_a_restart() {
    let server = MockServer::start().await;
    mount_code_exchange(&server, "ABC", "access-1", "refresh-1").await;
    mount_refresh(&server, "refresh-1", "access-2", "refresh-2").await;
    mount_refresh(&server, "refresh-2", "access-3", "refresh-3").await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let settings = settings(&server, free_port(), &store_path, 10);

    let first_run = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(ConsentingBrowser::new("ABC"));
    first_run.authenticate().await.unwrap();

    let browser = IdleBrowser::default();
    let second_run = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(browser.clone());
    let session = second_run.authenticate().await.unwrap();

    assert_eq!(second_run.state(), FlowState::Authenticated);
    assert_eq!(session.token().access_token, "access-3");
    assert!(browser.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_access_token_after_exchange_fails() {
    let server = MockServer::start().await;
    mount_code_exchange(&server, "ABC", "", "refresh-1").await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let settings = settings(&server, free_port(), &store_path, 10);

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(ConsentingBrowser::new("ABC"));

    let err = flow.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::Authentication(_)));
    assert_eq!(flow.state(), FlowState::Failed);
    assert!(FileTokenStore::new(&store_path).load().unwrap().is_none());
}

#[tokio::test]
async fn rejected_code_surfaces_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Auth code doesn't exist or is invalid for the client"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let port = free_port();
    let settings = settings(&server, port, &store_path, 10);

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(ConsentingBrowser::new("EXPIRED"));

    let err = flow.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::Authentication(_)));
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn unanswered_consent_times_out() {
    let server = MockServer::start().await;
    mount_no_token_calls(&server).await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let port = free_port();
    let settings = settings(&server, port, &store_path, 1);
    let browser = IdleBrowser::default();

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(browser.clone());

    let err = flow.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::Timeout));
    assert_eq!(flow.state(), FlowState::Failed);
    assert_eq!(browser.opened.lock().unwrap().len(), 1);
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn force_reauth_discards_stored_token() {
    let server = MockServer::start().await;
    mount_code_exchange(&server, "NEW", "access-1", "refresh-1").await;
    mount_refresh(&server, "refresh-1", "access-2", "refresh-2").await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    FileTokenStore::new(&store_path)
        .save(&AccessToken::bearer("stale-access"))
        .unwrap();

    let settings = settings(&server, free_port(), &store_path, 10);
    let browser = ConsentingBrowser::new("NEW");
    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(browser.clone());

    let session = flow.force_reauth().await.unwrap();

    assert_eq!(session.token().access_token, "access-2");
    assert_eq!(browser.opened.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_refresh_of_stored_token_keeps_it_and_skips_consent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh token has expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("token.json");
    let saved = AccessToken::new(
        "access-saved".to_string(),
        Some("refresh-saved".to_string()),
        "bearer".to_string(),
        Some(3600),
    );
    FileTokenStore::new(&store_path).save(&saved).unwrap();

    let port = free_port();
    let settings = settings(&server, port, &store_path, 1);
    let browser = IdleBrowser::default();

    let flow = AuthorizationCodeFlow::new(&settings)
        .with_store(FileTokenStore::new(&store_path))
        .with_browser(browser.clone());

    let err = flow.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::Authentication(_)));
    assert_eq!(flow.state(), FlowState::Failed);
    assert!(browser.opened.lock().unwrap().is_empty());
    assert_eq!(FileTokenStore::new(&store_path).load().unwrap(), Some(saved));
}

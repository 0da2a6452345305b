use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use oauth2::CsrfToken;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::{Html, WithStatus};
use warp::Filter;
use crate::config::Settings;
use crate::error::{AuthError, AuthResult};

/// How long a closing listener may take to drain before it is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// CSRF state of the single in-flight authorization request.
///
/// Verifying it consumes it, so a state can only ever be accepted once.
#[derive(Debug)]
pub struct PendingAuthorization {
    state: String,
}

impl PendingAuthorization {
    /// Fresh random state
    pub fn new() -> Self {
        Self::with_state(CsrfToken::new_random().secret().clone())
    }

    pub fn with_state(state: impl Into<String>) -> Self {
        Self { state: state.into() }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Checks the callback query against this authorization
    pub fn verify(self, params: &HashMap<String, String>) -> AuthResult<CallbackResult> {
        if let Some(error) = params.get("error") {
            return match error.as_str() {
                "access_denied" => Err(AuthError::AccessDenied),
                other => {
                    let description = params
                        .get("error_description")
                        .map(String::as_str)
                        .unwrap_or("no description");
                    Err(AuthError::authentication(format!(
                        "Authorization server returned '{}': {}",
                        other, description
                    )))
                }
            };
        }

        let received_state = params.get("state").ok_or(AuthError::InvalidState)?;
        if received_state != &self.state {
            log::error!("🚨 OAuth2 state mismatch on callback, possible CSRF attempt");
            return Err(AuthError::InvalidState);
        }

        let code = params
            .get("code")
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::InvalidCode("authorization code missing from callback".to_string()))?;

        log::info!("✅ OAuth2 callback verified");

        Ok(CallbackResult {
            code: code.clone(),
            state: self.state,
        })
    }
}

impl Default for PendingAuthorization {
    fn default() -> Self {
        Self::new()
    }
}

/// Verified callback payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: String,
    pub state: String,
}

type CallbackSender = oneshot::Sender<AuthResult<CallbackResult>>;
type Slot = Arc<Mutex<Option<(CallbackSender, PendingAuthorization)>>>;

/// Local HTTP listener that captures one OAuth2 redirect
#[derive(Debug, Clone)]
pub struct CallbackServer {
    host: String,
    port: u16,
}

impl CallbackServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_settings(settings: &Settings) -> AuthResult<Self> {
        Ok(Self::new(settings.require_callback_hostname()?, settings.callback_port()))
    }

    fn resolve(&self) -> AuthResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                AuthError::config_error(format!(
                    "Cannot resolve callback address {}:{}: {}",
                    self.host, self.port, e
                ))
            })?
            .next()
            .ok_or_else(|| {
                AuthError::config_error(format!("No address found for {}:{}", self.host, self.port))
            })
    }

    /// Binds the listener for `pending`.
    ///
    /// Must run inside a tokio runtime. The socket is released when the
    /// returned [`BoundCallback`] is waited on or dropped.
    pub fn bind(self, pending: PendingAuthorization) -> AuthResult<BoundCallback> {
        let addr = self.resolve()?;
        let (result_tx, result_rx) = oneshot::channel::<AuthResult<CallbackResult>>();
        let slot: Slot = Arc::new(Mutex::new(Some((result_tx, pending))));

        let routes = warp::get()
            .and(warp::path::full())
            .and(warp::query::<HashMap<String, String>>())
            .map(move |path: FullPath, params: HashMap<String, String>| {
                handle_request(&slot, path.as_str(), params)
            })
            .with(warp::filters::log::log("box_oauth::callback"));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (local_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| AuthError::callback_error(format!("Failed to bind {}: {}", addr, e)))?;

        log::info!("👂 Callback listener started on http://{}", local_addr);

        Ok(BoundCallback {
            local_addr,
            result_rx,
            guard: ListenerGuard {
                shutdown: Some(shutdown_tx),
                task: Some(tokio::spawn(server)),
            },
        })
    }
}

/// A bound listener waiting for its single callback
#[derive(Debug)]
pub struct BoundCallback {
    local_addr: SocketAddr,
    result_rx: oneshot::Receiver<AuthResult<CallbackResult>>,
    guard: ListenerGuard,
}

impl BoundCallback {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits up to `timeout` for the callback, then closes the listener
    pub async fn wait(self, timeout: Duration) -> AuthResult<CallbackResult> {
        let BoundCallback { result_rx, guard, .. } = self;

        let outcome = tokio::time::timeout(timeout, result_rx).await;
        guard.close().await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::callback_error("Callback channel closed")),
            Err(_) => Err(AuthError::Timeout),
        }
    }
}

/// Owns the listener task; closes it when dropped
#[derive(Debug)]
struct ListenerGuard {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerGuard {
    async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                log::warn!("⚠️ Callback listener did not drain in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }

        log::info!("🔒 Callback listener closed");
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn is_authorization_response(params: &HashMap<String, String>) -> bool {
    ["code", "state", "error"].iter().any(|key| params.contains_key(*key))
}

fn handle_request(
    slot: &Slot,
    path: &str,
    params: HashMap<String, String>,
) -> WithStatus<Html<&'static str>> {
    if !is_authorization_response(&params) {
        log::debug!("Request to {} carries no OAuth2 parameters, serving waiting page", path);
        return warp::reply::with_status(warp::reply::html(WAITING_PAGE), StatusCode::OK);
    }

    let taken = match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    let Some((result_tx, pending)) = taken else {
        log::warn!("⚠️ Authorization already consumed, ignoring callback on {}", path);
        return warp::reply::with_status(warp::reply::html(ALREADY_USED_PAGE), StatusCode::GONE);
    };

    log::info!("📨 OAuth2 callback received on {}", path);

    let result = pending.verify(&params);
    let (page, status) = match &result {
        Ok(_) => (SUCCESS_PAGE, StatusCode::OK),
        Err(_) => (ERROR_PAGE, StatusCode::BAD_REQUEST),
    };

    let _ = result_tx.send(result);

    warp::reply::with_status(warp::reply::html(page), status)
}

const WAITING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Box OAuth2 - Waiting</title></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 50px;">
    <h1>Waiting for authorization...</h1>
    <p>Complete the authorization in the Box window.</p>
</body>
</html>
"#;

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Box OAuth2 - Authorized</title></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 50px;">
    <h1 style="color: #28a745;">Authorization complete</h1>
    <p>You can close this window and return to the application.</p>
    <script>setTimeout(() => window.close(), 3000);</script>
</body>
</html>
"#;

const ERROR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Box OAuth2 - Error</title></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 50px;">
    <h1 style="color: #dc3545;">Authorization failed</h1>
    <p>The authorization response was rejected. Check the application log and try again.</p>
</body>
</html>
"#;

const ALREADY_USED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Box OAuth2 - Already used</title></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 50px;">
    <h1>This authorization request was already handled</h1>
    <p>You can close this window.</p>
</body>
</html>
"#;

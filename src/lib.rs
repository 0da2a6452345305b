//! # box_oauth
//!
//! Authentication helpers for the Box API.
//!
//! ## Features
//!
//! - OAuth2 authorization code with a one-shot local callback listener
//! - JWT server authentication from a Box app config file
//! - Client-credentials grant for an enterprise or a user
//! - Token persistence between runs
//! - A small API client for the demo commands
//!
//! ## Example
//!
//! ```no_run
//! use box_oauth::{AuthBroker, BoxClient, Settings, Strategy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let session = AuthBroker::new(&settings)
//!         .authenticate(Strategy::AuthorizationCode { force: false })
//!         .await?;
//!     let user = BoxClient::new(&session, settings.api_base_url())?.current_user().await?;
//!     println!("Hello, I'm {} ({}) [{}]", user.name, user.login, user.id);
//!     Ok(())
//! }
//! ```

/// Authentication strategies and token handling
pub mod auth;

/// Box API clients
pub mod client;

/// Settings loaded from the environment
pub mod config;

/// Error types
pub mod error;

pub use auth::{AuthBroker, Session, Strategy, Subject};
pub use client::{BoxClient, BoxOAuthClient, CreateOutcome};
pub use config::Settings;
pub use error::{AuthError, AuthResult, ErrorKind};

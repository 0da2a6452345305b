pub mod broker;
pub mod callback;
pub mod ccg;
pub mod jwt;
pub mod oauth;
pub mod session;
pub mod token;

pub use broker::{AuthBroker, Strategy};
pub use callback::{CallbackServer, PendingAuthorization};
pub use ccg::ClientCredentialsAuth;
pub use jwt::JwtAuth;
pub use oauth::{AuthorizationCodeFlow, BrowserOpener, FlowState, SystemBrowser};
pub use session::{Grant, Session, Subject};
pub use token::{AccessToken, FileTokenStore, TokenStore};

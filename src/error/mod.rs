pub mod auth_error;

pub use auth_error::{AuthError, AuthResult, ErrorKind};

pub mod api;
pub mod endpoint;

pub use api::{BoxClient, CreateOutcome, Folder, User};
pub use endpoint::BoxOAuthClient;

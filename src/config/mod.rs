pub mod env;

pub use env::Settings;

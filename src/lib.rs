// Library for the loader binary and tests

pub mod bucketer;
pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod sink;
pub mod window;
pub mod worker;

pub use error::{Error, Result};

/// `<package>/<version>`, logged at startup.
pub const LOADER_ID: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub mod backend;
pub mod capture;
pub mod debug_log;
pub mod error;
pub mod events;
pub mod loader;
pub mod model;
pub mod payload;
pub mod remote;
pub mod settings;
pub mod sink;

pub use error::{DocsnapError, Result};

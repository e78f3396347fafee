pub mod config;
pub mod error;
pub mod platform;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{PrFirmError, Result, RunFailure};
pub use platform::{PlatformRegistry, PlatformSpec};
pub use state::SharedState;
pub use traits::{LlmClient, StyleChecker};
pub use types::*;

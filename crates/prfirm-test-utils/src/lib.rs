//! Mocks and fixtures shared by the PR Firm test suites.

pub mod checkers;
pub mod fixtures;
pub mod llm;

pub use checkers::{AlwaysViolating, NeverViolating};
pub use fixtures::{campaign_state, config_file, fast_config, intents_reply};
pub use llm::{FailingLlm, FnLlm, ScriptedLlm};

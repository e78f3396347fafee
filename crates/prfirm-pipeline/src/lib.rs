//! The PR Firm campaign pipeline: every stage from request normalisation to
//! the packaged deliverable, wired into one flow with a bounded revision
//! loop.

pub mod context;
pub mod json;
pub mod persona;
pub mod pipeline;
pub mod report;
pub mod revision;
pub mod stages;
pub mod style;

pub use context::StageContext;
pub use pipeline::{build_flow, Pipeline};
pub use revision::{decide, Decision};
pub use style::{place_hashtags, rewrite_with_constraints, HouseStyleChecker};

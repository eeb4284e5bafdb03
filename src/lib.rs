//! reco-engine - Personalized recommendation engine.
//!
//! Content-based similarity retrieval feeds a Thompson-sampling contextual
//! bandit, with an A/B testing layer to measure the bandit's effect on the
//! baseline similarity ranking. Exposed as a library so integration tests
//! can build an `AppState` directly against an in-memory `Store`.

pub mod abtest;
pub mod bandit;
pub mod config;
pub mod domain;
pub mod encoder;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod pipeline;
pub mod reward;
pub mod similarity;
pub mod state;
pub mod store;
pub mod trainer;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

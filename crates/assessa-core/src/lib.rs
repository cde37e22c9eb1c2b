//! assessa-core — Assessment session and scoring engine.
//!
//! This crate resolves a survey's question set from its configured source,
//! freezes it into a per-candidate snapshot, scores submissions and
//! aggregates responses into statistics. Storage and access control are
//! reached only through the ports in [`traits`].

pub mod answer;
pub mod engine;
pub mod error;
pub mod mask;
pub mod model;
pub mod quota;
pub mod response;
pub mod scoring;
pub mod source;
pub mod statistics;
pub mod traits;

pub use engine::{AssessmentEngine, EngineConfig, ResubmitPolicy};
pub use error::{EngineError, ErrorKind};

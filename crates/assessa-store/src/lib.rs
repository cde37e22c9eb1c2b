//! assessa-store — storage backends for the assessment engine.
//!
//! Implements the `assessa-core` ports twice: [`MemoryStore`] keeps
//! everything in process memory, [`JsonDirStore`] keeps one JSON document
//! per record under a data directory. Also loads the `assessa.toml`
//! configuration.

pub mod config;
pub mod entitlement;
pub mod json_dir;
pub mod memory;

pub use config::{load_config, load_config_from, AssessaConfig};
pub use entitlement::{Entitlement, EntitlementKind};
pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

//! Arbor Core - Persistent code knowledge graph with session memory
//!
//! This library maintains an incrementally updated graph of modules,
//! classes, functions, and methods extracted from Python source, together
//! with free-form session observations and bounded markdown renderers
//! (capsule and resume) for downstream consumers.

pub mod capsule;
pub mod config;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod model;
pub mod observations;
pub mod parse;
pub mod resume;
pub mod skeleton;
pub mod store;
pub mod watcher;

pub use capsule::generate_capsule;
pub use config::Config;
pub use error::ArborError;
pub use graph::{Graph, Neighborhood};
pub use indexer::Indexer;
pub use model::{Edge, EdgeKind, IndexedFile, Node, NodeKind, Observation};
pub use observations::ObservationStore;
pub use resume::generate_resume;
pub use skeleton::{skeletonize, skeletonize_file};
pub use store::{Store, StoreStats};
pub use watcher::ProjectWatcher;

/// Result type alias for arbor operations
pub type Result<T> = std::result::Result<T, ArborError>;

//! CAIRN Storage - Registry Persistence
//!
//! The node-and-edge storage abstraction, its in-memory implementation and
//! the registry coordinator that persists artifacts, ontologies and stored
//! queries on top of it.

pub mod backend;
pub mod codec;
pub mod context;
pub mod memory;
pub mod ontologies;
pub mod reader;
pub mod registry;
pub mod stored_queries;
pub mod unit_of_work;

pub use backend::{BackendSession, Edge, NodeRef, StorageBackend, Value};
pub use context::SessionContext;
pub use memory::{MemoryBackend, MemorySession};
pub use ontologies::load_ontologies;
pub use reader::ArtifactReader;
pub use registry::{BatchItem, Registry, DEFAULT_PRINCIPAL};
pub use stored_queries::load_stored_query;
pub use unit_of_work::{UnitOfWork, UnitState};

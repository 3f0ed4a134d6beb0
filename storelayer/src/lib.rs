//! Main storelayer crate: one persistence contract over many NoSQL backends.
//!
//! This crate is the primary entry point for users of storelayer. It
//! re-exports the core types from `storelayer-core` and gives access to the
//! available backend families.
//!
//! # Features
//!
//! - **One contract, many engines** - The same create/find/update/destroy calls work against every backend
//! - **Capability-driven emulation** - Multi-get, filtering and uniqueness are emulated where a backend lacks them
//! - **Schema-driven transcoding** - Dates, numbers and booleans survive string-only stores
//! - **Typed models** - Serde structs through [`Repository`](repository::Repository)
//!
//! # Quick Start
//!
//! ```ignore
//! use storelayer::{prelude::*, memory::MemoryHashBackend};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let registry = ModelRegistry::new().define(
//!         ModelDefinition::new("Widget")
//!             .property("name", PropertyKind::Text)
//!             .property("createdAt", PropertyKind::Date),
//!     );
//!
//!     let coordinator = Coordinator::builder(MemoryHashBackend::new())
//!         .registry(registry)
//!         .initialize()
//!         .await?;
//!
//!     let created = coordinator
//!         .create("Widget", doc! { "name": "a" }, &Options::new())
//!         .await?;
//!
//!     // `createdAt` is declared but absent, so it comes back as null.
//!     let widget = coordinator.find_by_id("Widget", created.id, &Options::new()).await?;
//!
//!     let recent = coordinator
//!         .all(
//!             "Widget",
//!             &Query::builder()
//!                 .filter(Filter::starts_with("name", "a"))
//!                 .sort("name", SortDirection::Asc)
//!                 .limit(10)
//!                 .build(),
//!             &Options::new(),
//!         )
//!         .await?;
//!
//!     coordinator.disconnect().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process document, hash and ordered stores
//! - [`mongodb`] - MongoDB (requires the `mongodb` feature)

pub mod prelude;

pub use storelayer_core::{
    backend, config, connection, coordinator, error, filter, id, query, record, repository, schema, transcode,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory backend families.
pub mod memory {
    pub use storelayer_memory::{
        MemoryDocumentAdapter, MemoryDocumentBackend, MemoryHashAdapter, MemoryHashBackend, MemoryLogAdapter,
        MemoryLogBackend, MemoryServer, Session, document, hash, log, server,
    };
}

/// MongoDB backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use storelayer_mongodb::{MongoDbAdapter, MongoDbBackend, MongoDbClient};
}

//! In-memory storage backends for storelayer.
//!
//! This crate provides three in-process backend families, each modelled on a
//! different kind of storage engine so that every coordinator code path can
//! be exercised without a running server:
//!
//! - **Document store** ([`document`]) - Revisioned documents with unique keys
//! - **Hash store** ([`hash`]) - Flat string maps, no uniqueness, no native types
//! - **Ordered store** ([`log`]) - Sorted keyspace with batched reads and filtered scans
//!
//! Every backend wraps a [`MemoryServer`](server::MemoryServer). Clones of a
//! server share its data, which lets tests hold on to the server, take it
//! offline with [`set_available`](server::MemoryServer::set_available) and
//! count the sessions it handed out.
//!
//! # Quick Start
//!
//! ```ignore
//! use storelayer::{prelude::*, memory::MemoryDocumentBackend};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let coordinator = Coordinator::builder(MemoryDocumentBackend::new())
//!         .settings(ConnectionSettings::builder().database("app").build())
//!         .initialize()
//!         .await?;
//!
//!     coordinator.create("Widget", doc! { "name": "a" }, &Options::new()).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as storelayer_memory;

pub mod document;
pub mod hash;
pub mod log;
pub mod server;

pub use document::{MemoryDocumentAdapter, MemoryDocumentBackend};
pub use hash::{MemoryHashAdapter, MemoryHashBackend};
pub use log::{MemoryLogAdapter, MemoryLogBackend};
pub use server::{MemoryServer, Session};

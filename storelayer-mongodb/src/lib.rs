//! MongoDB backend for storelayer.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! storelayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Unique keys** - Creates on an existing id surface the duplicate key error as a conflict
//! - **Batched reads** - `find_by_ids` becomes a single `$in` query
//! - **Native filtering** - Predicates are translated into MongoDB filter documents
//! - **Safe field names** - Dots and dollar signs in keys are escaped on write
//!
//! # Example
//!
//! ```ignore
//! use storelayer::{prelude::*, mongodb::MongoDbBackend};
//!
//! #[tokio::main]
//! async fn main() -> StoreResult<()> {
//!     let coordinator = Coordinator::builder(MongoDbBackend::new())
//!         .settings(
//!             ConnectionSettings::builder()
//!                 .url("mongodb://localhost:27017")
//!                 .database("my_database")
//!                 .build(),
//!         )
//!         .initialize()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as storelayer_mongodb;

pub mod backend;
mod query;
mod sanitizer;

pub use backend::{MongoDbAdapter, MongoDbBackend, MongoDbClient};

//! A backend-agnostic persistence layer for NoSQL storage engines.
//!
//! This crate is the core of the storelayer project and provides:
//!
//! - **Coordinator** ([`coordinator`]) - The single entry point: connection lifecycle, adapter cache and the generic CRUD/query contract
//! - **Backend abstraction** ([`backend`]) - Traits for backend families and their per-model adapters
//! - **Connection management** ([`connection`]) - Single-flight connect and a connection provider shared with adapters
//! - **Records and identifiers** ([`record`]) - The uniform record shape, ids, options and operation outcomes
//! - **Model schema** ([`schema`]) - Property registry driving transcoding decisions
//! - **Transcoding** ([`transcode`]) - Conversion between model values and backend-native values
//! - **Queries and filtering** ([`query`], [`filter`]) - Predicate AST and the in-memory evaluator
//! - **Typed models** ([`repository`]) - Serde-backed typed access to a model
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use storelayer_core::{coordinator::Coordinator, record::Options, query::Filter};
//! use bson::doc;
//!
//! let coordinator = Coordinator::builder(backend).registry(registry).initialize().await?;
//!
//! let created = coordinator.create("Widget", doc! { "name": "a" }, &Options::new()).await?;
//! let matched = coordinator
//!     .count("Widget", Some(&Filter::eq("name", "a")), &Options::new())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as storelayer_core;

pub mod backend;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod id;
pub mod query;
pub mod record;
pub mod repository;
pub mod schema;
pub mod transcode;

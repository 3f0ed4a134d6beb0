//! Convenient re-exports of commonly used types from storelayer.
//!
//! ```ignore
//! use storelayer::prelude::*;
//! ```

pub use storelayer_core::{
    backend::{Adapter, AdapterContext, Backend, Capabilities, KeyedRecord, ModelScope},
    config::{ConnectionSettings, ConnectionSettingsBuilder},
    coordinator::{Coordinator, CoordinatorBuilder},
    error::{StoreError, StoreResult},
    filter::{DocumentEvaluator, PredicateEvaluator},
    id::{IdGenerator, RandomIdGenerator, SequenceIdGenerator},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    record::{Count, Options, Record, RecordId, WriteResult},
    repository::{Model, ModelExt, Repository},
    schema::{ModelDefinition, ModelRegistry, PropertyDescriptor, PropertyKind, PropertyRegistry},
    transcode::NativeTypes,
};

//! # sift-store
//!
//! Durable storage and retrieval for embedded chunks, on Postgres with the
//! pgvector extension.
//!
//! Write side: [`ChunkStore`] persists a document's chunks with
//! transactional replace semantics at the `(source scope, document key)`
//! grain. Read side: [`QueryService`] embeds a question, applies
//! context-derived equality filters, and returns rows ranked by vector
//! similarity.
//!
//! Both sides share one connection pool per connection string (see
//! [`pool::SharedPool`]) and agree on physical column names only through the
//! metadata schema's column mapping.
//!
//! The library manages no DDL. Each configured table needs columns for
//! chunk content, chunk index, the embedding (`VECTOR(D)`), the mapped
//! document key, all mapped metadata fields, and the source key columns;
//! index creation (e.g. HNSW) is the operator's responsibility.

pub mod error;
pub mod pool;
pub mod query;
mod sql;
pub mod store;

pub use error::{DatabaseError, StoreError};
pub use pool::{PoolOptions, SharedPool};
pub use query::{
    DistanceFunction, FilterResolver, FilterValue, QueryService, QueryServiceConfig, SearchRequest,
};
pub use store::{ChunkStore, ChunkStoreConfig};

//! # sift-core
//!
//! Core building blocks shared by every sift crate:
//!
//! - The metadata **schema**: caller-declared typed fields, one of which is
//!   the document key and zero-or-more of which are source keys, bound to
//!   physical database columns through the **column mapping**.
//! - The **field value** model bridging caller metadata (serde JSON image)
//!   and SQL parameters.
//! - SQL **identifier** validation and quoting.
//! - The cross-cutting **error taxonomy**: validation, configuration, and
//!   operation errors. Database and embedder errors live in their own
//!   crates (`sift-store`, `sift-embed`).

pub mod error;
pub mod field;
pub mod identifier;
pub mod mapping;
pub mod schema;
pub mod types;

pub use error::{ConfigError, OperationError, ValidationError, ValidationIssue};
pub use field::{FieldType, FieldValue};
pub use mapping::ColumnMap;
pub use schema::{FieldSpec, MetadataSchema, MetadataSchemaBuilder, ValidatedMetadata};
pub use types::{Chunk, Document, EmbeddedChunk, QueryResult};

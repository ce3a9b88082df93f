//! Frozen logical-field → physical-column mapping.
//!
//! Built by [`MetadataSchemaBuilder`](crate::schema::MetadataSchemaBuilder);
//! immutable afterwards. The mapping is the single place where the write
//! side's static context and the read side's filter resolver agree on
//! physical column names.

use std::collections::BTreeMap;

/// Default physical column for chunk text.
pub const DEFAULT_CONTENT_COLUMN: &str = "chunk_content";
/// Default physical column for the chunk's position in its document.
pub const DEFAULT_INDEX_COLUMN: &str = "chunk_index";
/// Default physical column for the embedding vector.
pub const DEFAULT_EMBEDDING_COLUMN: &str = "embedding";

/// Physical column names for every logical metadata field plus the three
/// fixed chunk columns.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) document_key: String,
    pub(crate) source_keys: Vec<String>,
    pub(crate) content: String,
    pub(crate) index: String,
    pub(crate) embedding: String,
}

impl ColumnMap {
    /// Physical column for a logical field, if declared.
    #[must_use]
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// The logical field distinguished as the document key.
    #[must_use]
    pub fn document_key_field(&self) -> &str {
        &self.document_key
    }

    /// Physical column of the document key (the mapping of its logical
    /// field, never a separate name).
    #[must_use]
    pub fn document_key_column(&self) -> &str {
        self.fields
            .get(&self.document_key)
            .map_or(self.document_key.as_str(), String::as_str)
    }

    /// Logical source key fields, in declaration order.
    #[must_use]
    pub fn source_key_fields(&self) -> &[String] {
        &self.source_keys
    }

    /// Physical columns of the source keys, in declaration order.
    #[must_use]
    pub fn source_key_columns(&self) -> Vec<&str> {
        self.source_keys
            .iter()
            .map(|field| {
                self.fields
                    .get(field)
                    .map_or(field.as_str(), String::as_str)
            })
            .collect()
    }

    /// Physical column holding chunk text.
    #[must_use]
    pub fn content_column(&self) -> &str {
        &self.content
    }

    /// Physical column holding the chunk index.
    #[must_use]
    pub fn index_column(&self) -> &str {
        &self.index
    }

    /// Physical column holding the embedding vector.
    #[must_use]
    pub fn embedding_column(&self) -> &str {
        &self.embedding
    }

    /// All `(logical field, physical column)` pairs, sorted by field name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(field, column)| (field.as_str(), column.as_str()))
    }
}

//! Metadata schema: declared fields, key designation, and runtime validation.
//!
//! A [`MetadataSchema`] is built once per table and frozen. It owns the
//! [`ColumnMap`] and performs the strict runtime validation at the two trust
//! boundaries: caller metadata entering a store ([`MetadataSchema::validate`])
//! and database rows leaving a query ([`MetadataSchema::decode`]). Internal
//! helpers never re-validate.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ConfigError, ValidationError, ValidationIssue};
use crate::field::{FieldType, FieldValue, json_type_name};
use crate::identifier::{ensure_identifier, snake_case};
use crate::mapping::{
    ColumnMap, DEFAULT_CONTENT_COLUMN, DEFAULT_EMBEDDING_COLUMN, DEFAULT_INDEX_COLUMN,
};

/// Forbidden metadata field name: clashes with the discriminator used by
/// polymorphic metadata descriptors.
pub const RESERVED_FIELD: &str = "type";

/// Declared type and nullability of one metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub ty: FieldType,
    pub nullable: bool,
}

/// Caller-declared metadata descriptor for one table.
#[derive(Debug, Clone)]
pub struct MetadataSchema {
    fields: BTreeMap<String, FieldSpec>,
    columns: ColumnMap,
}

/// Builder for [`MetadataSchema`]. All validation happens in
/// [`build`](MetadataSchemaBuilder::build).
#[derive(Debug, Clone)]
pub struct MetadataSchemaBuilder {
    fields: BTreeMap<String, FieldSpec>,
    document_key: String,
    source_keys: Vec<String>,
    column_overrides: BTreeMap<String, String>,
    content_column: Option<String>,
    index_column: Option<String>,
    embedding_column: Option<String>,
}

impl MetadataSchema {
    /// Start declaring a schema whose document key is `document_key`.
    #[must_use]
    pub fn builder(document_key: impl Into<String>) -> MetadataSchemaBuilder {
        MetadataSchemaBuilder {
            fields: BTreeMap::new(),
            document_key: document_key.into(),
            source_keys: Vec::new(),
            column_overrides: BTreeMap::new(),
            content_column: None,
            index_column: None,
            embedding_column: None,
        }
    }

    /// The frozen column mapping.
    #[must_use]
    pub const fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    /// Spec of a declared field.
    #[must_use]
    pub fn field_spec(&self, field: &str) -> Option<FieldSpec> {
        self.fields.get(field).copied()
    }

    /// All declared fields, sorted by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), *spec))
    }

    /// Validate caller metadata against the declared fields.
    ///
    /// Strict: unknown fields are rejected; declared types are enforced;
    /// non-nullable fields (the document key and source keys among them)
    /// must be present and non-null.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every failed check.
    pub fn validate<M: Serialize>(&self, metadata: &M) -> Result<ValidatedMetadata, ValidationError> {
        let image = serde_json::to_value(metadata).map_err(|e| {
            ValidationError::single(ValidationIssue::new(
                "$",
                format!("metadata is not serializable: {e}"),
                "object",
                "error",
            ))
        })?;
        let Value::Object(map) = image else {
            return Err(ValidationError::single(ValidationIssue::new(
                "$",
                "metadata is not a record",
                "object",
                json_type_name(&image),
            )));
        };

        let mut issues = Vec::new();
        let mut values = BTreeMap::new();

        for (name, spec) in &self.fields {
            match map.get(name) {
                None | Some(Value::Null) => {
                    if !spec.nullable {
                        issues.push(ValidationIssue::new(
                            name,
                            "missing required field",
                            spec.ty.name(),
                            "null",
                        ));
                    }
                }
                Some(value) => match FieldValue::from_json(spec.ty, value, name) {
                    Ok(field_value) => {
                        values.insert(name.clone(), field_value);
                    }
                    Err(issue) => issues.push(issue),
                },
            }
        }

        for name in map.keys() {
            if !self.fields.contains_key(name) {
                issues.push(ValidationIssue::new(
                    name,
                    "unknown field",
                    "a declared field",
                    json_type_name(&map[name]),
                ));
            }
        }

        if !issues.is_empty() {
            return Err(ValidationError::from_issues(issues));
        }

        // The document key is always non-nullable at build time, so it is
        // guaranteed present here.
        Ok(ValidatedMetadata {
            document_key_field: self.columns.document_key_field().to_string(),
            values,
        })
    }

    /// Decode a row's metadata columns back into the caller's type.
    ///
    /// `values` is keyed by logical field name; `None` means SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a required field is NULL in the row
    /// or the assembled record does not deserialize into `M` (a malformed
    /// row fails fast rather than producing a half-typed result).
    pub fn decode<M: DeserializeOwned>(
        &self,
        values: &BTreeMap<String, Option<FieldValue>>,
    ) -> Result<M, ValidationError> {
        let mut issues = Vec::new();
        let mut image = serde_json::Map::new();

        for (name, spec) in &self.fields {
            match values.get(name) {
                Some(Some(value)) => {
                    image.insert(name.clone(), value.to_json());
                }
                Some(None) | None => {
                    if spec.nullable {
                        image.insert(name.clone(), Value::Null);
                    } else {
                        issues.push(ValidationIssue::new(
                            name,
                            "row is missing a required field",
                            spec.ty.name(),
                            "null",
                        ));
                    }
                }
            }
        }

        if !issues.is_empty() {
            return Err(ValidationError::from_issues(issues));
        }

        serde_json::from_value(Value::Object(image)).map_err(|e| {
            ValidationError::single(ValidationIssue::new(
                "$",
                format!("row does not match the metadata type: {e}"),
                "metadata record",
                "row",
            ))
        })
    }

}

impl MetadataSchemaBuilder {
    /// Declare a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields
            .insert(name.into(), FieldSpec { ty, nullable: false });
        self
    }

    /// Declare a field that may be absent or null.
    #[must_use]
    pub fn nullable_field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields
            .insert(name.into(), FieldSpec { ty, nullable: true });
        self
    }

    /// Add a logical field to the source scope. Order is preserved.
    #[must_use]
    pub fn source_key(mut self, name: impl Into<String>) -> Self {
        self.source_keys.push(name.into());
        self
    }

    /// Override the physical column for one logical field.
    #[must_use]
    pub fn map_column(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.column_overrides.insert(field.into(), column.into());
        self
    }

    /// Override the chunk content column (default `chunk_content`).
    #[must_use]
    pub fn content_column(mut self, column: impl Into<String>) -> Self {
        self.content_column = Some(column.into());
        self
    }

    /// Override the chunk index column (default `chunk_index`).
    #[must_use]
    pub fn index_column(mut self, column: impl Into<String>) -> Self {
        self.index_column = Some(column.into());
        self
    }

    /// Override the embedding column (default `embedding`).
    #[must_use]
    pub fn embedding_column(mut self, column: impl Into<String>) -> Self {
        self.embedding_column = Some(column.into());
        self
    }

    /// Validate the declaration and freeze it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document key or a source key is
    /// undeclared, a field or column name fails the identifier pattern, the
    /// reserved field name `type` is declared, or two logical fields share a
    /// physical column.
    pub fn build(mut self) -> Result<MetadataSchema, ConfigError> {
        for name in self.fields.keys() {
            if name == RESERVED_FIELD {
                return Err(ConfigError::ReservedField { field: name.clone() });
            }
            ensure_identifier(name, "metadata field name")?;
        }

        if !self.fields.contains_key(&self.document_key) {
            return Err(ConfigError::MissingField {
                field: self.document_key,
                context: "document key",
            });
        }
        for key in &self.source_keys {
            if !self.fields.contains_key(key) {
                return Err(ConfigError::MissingField {
                    field: key.clone(),
                    context: "source key",
                });
            }
        }

        // The document key and source keys identify rows; null would break
        // the replace scope, so force them required.
        if let Some(spec) = self.fields.get_mut(&self.document_key) {
            spec.nullable = false;
        }
        for key in &self.source_keys {
            if let Some(spec) = self.fields.get_mut(key) {
                spec.nullable = false;
            }
        }

        let mut fields = BTreeMap::new();
        for name in self.fields.keys() {
            let column = self
                .column_overrides
                .get(name)
                .cloned()
                .unwrap_or_else(|| snake_case(name));
            ensure_identifier(&column, "column mapping")?;
            fields.insert(name.clone(), column);
        }

        let content = self
            .content_column
            .unwrap_or_else(|| DEFAULT_CONTENT_COLUMN.to_string());
        let index = self
            .index_column
            .unwrap_or_else(|| DEFAULT_INDEX_COLUMN.to_string());
        let embedding = self
            .embedding_column
            .unwrap_or_else(|| DEFAULT_EMBEDDING_COLUMN.to_string());
        ensure_identifier(&content, "content column")?;
        ensure_identifier(&index, "index column")?;
        ensure_identifier(&embedding, "embedding column")?;

        let mut seen = std::collections::BTreeSet::new();
        for column in fields
            .values()
            .map(String::as_str)
            .chain([content.as_str(), index.as_str(), embedding.as_str()])
        {
            if !seen.insert(column) {
                return Err(ConfigError::DuplicateColumn {
                    column: column.to_string(),
                });
            }
        }

        Ok(MetadataSchema {
            fields: self.fields,
            columns: ColumnMap {
                fields,
                document_key: self.document_key,
                source_keys: self.source_keys,
                content,
                index,
                embedding,
            },
        })
    }
}

/// Metadata that passed [`MetadataSchema::validate`]. Null/absent nullable
/// fields are omitted.
#[derive(Debug, Clone)]
pub struct ValidatedMetadata {
    document_key_field: String,
    values: BTreeMap<String, FieldValue>,
}

impl ValidatedMetadata {
    /// Value of one field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// The document key value. Guaranteed present by validation.
    #[must_use]
    pub fn document_key(&self) -> &FieldValue {
        &self.values[&self.document_key_field]
    }

    /// All present `(field, value)` pairs, sorted by field name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

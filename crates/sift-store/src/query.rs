//! Read side: similarity-ranked search with context-derived filters.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use sift_core::error::{ValidationError, ValidationIssue};
use sift_core::field::{FieldType, FieldValue};
use sift_core::identifier::{ensure_identifier, is_valid_identifier, quote_identifier};
use sift_core::schema::MetadataSchema;
use sift_core::types::{Chunk, QueryResult};

use sift_embed::{EmbedError, Embedder};

use crate::error::{DatabaseError, StoreError};
use crate::pool::{PoolOptions, SharedPool};
use crate::sql::{self, Filter, SqlValue};

/// Distance operator used for ranking, selected at construction.
///
/// Every variant is expressed as a similarity score ordered descending.
/// Cosine is the reference behavior for the `[0, 1]` threshold semantics;
/// the other scores are clamped into that range at the row boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DistanceFunction {
    #[default]
    Cosine,
    Euclidean,
    InnerProduct,
}

impl DistanceFunction {
    /// SQL expression producing the similarity score for `$1`.
    fn score_expression(self, embedding_column: &str) -> String {
        let column = quote_identifier(embedding_column);
        match self {
            Self::Cosine => format!("(1 - ({column} <=> $1))"),
            Self::Euclidean => format!("(1 / (1 + ({column} <-> $1)))"),
            Self::InnerProduct => format!("(-({column} <#> $1))"),
        }
    }
}

/// One resolved filter value: a scalar or a set of scalars (`= ANY`).
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(FieldValue),
    List(Vec<FieldValue>),
}

impl From<FieldValue> for FilterValue {
    fn from(value: FieldValue) -> Self {
        Self::Scalar(value)
    }
}

/// Turns a request-time context into `physical column → value` equality
/// predicates. The write side's static context and this resolver must agree
/// on column names; the column mapping is the one place both read from.
#[async_trait]
pub trait FilterResolver<C>: Send + Sync {
    /// Resolve `context` into filters. May consult external state.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the context cannot be resolved into
    /// a valid filter set.
    async fn resolve(&self, context: &C) -> Result<BTreeMap<String, FilterValue>, ValidationError>;
}

/// Plain functions work as synchronous resolvers.
#[async_trait]
impl<C, F> FilterResolver<C> for F
where
    C: Sync,
    F: Fn(&C) -> BTreeMap<String, FilterValue> + Send + Sync,
{
    async fn resolve(&self, context: &C) -> Result<BTreeMap<String, FilterValue>, ValidationError> {
        Ok(self(context))
    }
}

/// One search call.
#[derive(Debug, Clone)]
pub struct SearchRequest<C> {
    /// Natural-language question. Must be non-empty after trimming.
    pub question: String,
    /// Maximum results, in `[1, 1000]`.
    pub limit: u32,
    /// Minimum similarity, in `[0, 1]`.
    pub similarity_threshold: f64,
    /// Caller context handed to the filter resolver.
    pub context: C,
}

impl<C> SearchRequest<C> {
    /// A request with `limit = 10` and no similarity floor.
    pub fn new(question: impl Into<String>, context: C) -> Self {
        Self {
            question: question.into(),
            limit: 10,
            similarity_threshold: 0.0,
            context,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// Configuration for [`QueryService`].
#[derive(Debug, Clone)]
pub struct QueryServiceConfig {
    /// Postgres connection string; shares its pool with any store using the
    /// same string.
    pub database_url: String,
    /// Table to search.
    pub table: String,
    /// Metadata declaration for decoding rows.
    pub schema: MetadataSchema,
    /// Ranking operator.
    pub distance: DistanceFunction,
    /// Pool sizing, applied when this connection string is first opened.
    pub pool: PoolOptions,
    /// Upper bound for the database query.
    pub query_timeout: Duration,
    /// Upper bound for embedding the question.
    pub embed_timeout: Duration,
}

impl QueryServiceConfig {
    /// Config with cosine distance, default pool options, and 30 s / 60 s
    /// query / embed timeouts.
    #[must_use]
    pub fn new(database_url: impl Into<String>, table: impl Into<String>, schema: MetadataSchema) -> Self {
        Self {
            database_url: database_url.into(),
            table: table.into(),
            schema,
            distance: DistanceFunction::Cosine,
            pool: PoolOptions::default(),
            query_timeout: Duration::from_secs(30),
            embed_timeout: Duration::from_secs(60),
        }
    }
}

/// Answers semantic queries over one chunk table.
pub struct QueryService<M, C> {
    table: String,
    schema: Arc<MetadataSchema>,
    distance: DistanceFunction,
    query_timeout: Duration,
    embed_timeout: Duration,
    pool: SharedPool,
    embedder: Arc<dyn Embedder>,
    resolver: Arc<dyn FilterResolver<C>>,
    _metadata: PhantomData<fn() -> M>,
}

impl<M, C> QueryService<M, C>
where
    M: DeserializeOwned + Send + Sync,
    C: Send + Sync,
{
    /// Validate the configuration and bind to the shared pool.
    ///
    /// # Errors
    ///
    /// Returns [`sift_core::error::ConfigError`] when the table name fails
    /// the identifier pattern, or [`DatabaseError`] when the connection
    /// string does not parse.
    pub fn connect(
        config: QueryServiceConfig,
        embedder: Arc<dyn Embedder>,
        resolver: Arc<dyn FilterResolver<C>>,
    ) -> Result<Self, StoreError> {
        ensure_identifier(&config.table, "table name")?;
        let pool = SharedPool::connect(&config.database_url, &config.pool)?;
        Ok(Self {
            table: config.table,
            schema: Arc::new(config.schema),
            distance: config.distance,
            query_timeout: config.query_timeout,
            embed_timeout: config.embed_timeout,
            pool,
            embedder,
            resolver,
            _metadata: PhantomData,
        })
    }

    /// Embed the question, apply resolved filters, and return rows ranked
    /// by descending similarity. Every returned similarity lies in
    /// `[0, 1]` and meets the request's threshold; ties are unordered.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] for out-of-range parameters or invalid filters
    /// (before any query executes); [`EmbedError`] from the embedder,
    /// propagated as-is; [`DatabaseError::QueryFailed`] for database
    /// failures, carrying the operation name but never the statement text.
    #[instrument(skip_all, fields(table = %self.table, limit = request.limit))]
    pub async fn search(&self, request: &SearchRequest<C>) -> Result<Vec<QueryResult<M>>, StoreError> {
        validate_request(request)?;

        let question = request.question.trim();
        let embedding = tokio::time::timeout(self.embed_timeout, self.embedder.embed(question))
            .await
            .map_err(|_| StoreError::Embed(EmbedError::Timeout))??;
        if embedding.is_empty() {
            return Err(EmbedError::InvalidResponse(
                "embedder returned an empty vector for the question".to_string(),
            )
            .into());
        }

        let filters = self.resolver.resolve(&request.context).await?;
        let compiled = compile_filters(&filters)?;

        let columns_map = self.schema.columns();
        let mut select_columns: Vec<&str> =
            vec![columns_map.content_column(), columns_map.index_column()];
        select_columns.extend(columns_map.iter().map(|(_, column)| column));

        let score_expr = self.distance.score_expression(columns_map.embedding_column());
        let filter_shapes: Vec<Filter<'_>> = compiled
            .iter()
            .map(|(column, value)| Filter {
                column,
                is_list: matches!(
                    value,
                    SqlValue::TextList(_)
                        | SqlValue::IntegerList(_)
                        | SqlValue::FloatList(_)
                        | SqlValue::BooleanList(_)
                        | SqlValue::TimestampList(_)
                ),
            })
            .collect();
        let statement = sql::search_statement(
            &self.table,
            &select_columns,
            &score_expr,
            &filter_shapes,
            request.limit,
        );

        let mut values = vec![
            SqlValue::Vector(pgvector::Vector::from(embedding)),
            SqlValue::Float(request.similarity_threshold),
        ];
        values.extend(compiled.into_iter().map(|(_, value)| value));

        let work = async {
            self.pool.ensure_vector_registered().await?;
            let client = self.pool.client().await?;
            client
                .query(statement.as_str(), &sql::bind(&values))
                .await
                .map_err(|e| DatabaseError::classify("search", &e))
        };
        let rows = tokio::time::timeout(self.query_timeout, work)
            .await
            .map_err(|_| DatabaseError::Timeout { operation: "search" })??;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            results.push(self.decode_row(row)?);
        }
        debug!(results = results.len(), "search completed");
        Ok(results)
    }

    /// Rebuild one result from a row: fixed chunk columns, the similarity
    /// score (clamped into `[0, 1]`), and the metadata record re-parsed
    /// through the schema. A malformed row fails the whole call.
    fn decode_row(&self, row: &tokio_postgres::Row) -> Result<QueryResult<M>, StoreError> {
        let columns_map = self.schema.columns();
        let content: String = get_column(row, columns_map.content_column())?;
        let index: i32 = get_column(row, columns_map.index_column())?;
        let similarity: f64 = get_column(row, "similarity")?;

        let mut fields = BTreeMap::new();
        for (field, spec) in self.schema.fields() {
            let column = columns_map.column_for(field).unwrap_or(field);
            let value = match spec.ty {
                FieldType::Text => get_column::<Option<String>>(row, column)?.map(FieldValue::Text),
                FieldType::Integer => {
                    get_column::<Option<i64>>(row, column)?.map(FieldValue::Integer)
                }
                FieldType::Float => get_column::<Option<f64>>(row, column)?.map(FieldValue::Float),
                FieldType::Boolean => {
                    get_column::<Option<bool>>(row, column)?.map(FieldValue::Boolean)
                }
                FieldType::Timestamp => get_column::<Option<DateTime<Utc>>>(row, column)?
                    .map(FieldValue::Timestamp),
            };
            fields.insert(field.to_string(), value);
        }
        let metadata: M = self.schema.decode(&fields)?;

        Ok(QueryResult {
            chunk: Chunk {
                content,
                index: u32::try_from(index).unwrap_or(0),
            },
            similarity: similarity.clamp(0.0, 1.0),
            metadata,
        })
    }
}

fn get_column<'a, T>(row: &'a tokio_postgres::Row, column: &str) -> Result<T, DatabaseError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column).map_err(|e| DatabaseError::QueryFailed {
        operation: "decode row",
        message: e.to_string(),
    })
}

fn validate_request<C>(request: &SearchRequest<C>) -> Result<(), ValidationError> {
    let mut issues = Vec::new();
    if request.question.trim().is_empty() {
        issues.push(ValidationIssue::new(
            "question",
            "question is empty",
            "non-empty text",
            "empty",
        ));
    }
    if !(1..=1000).contains(&request.limit) {
        issues.push(ValidationIssue::new(
            "limit",
            "limit out of range",
            "an integer in [1, 1000]",
            request.limit.to_string(),
        ));
    }
    if !request.similarity_threshold.is_finite()
        || !(0.0..=1.0).contains(&request.similarity_threshold)
    {
        issues.push(ValidationIssue::new(
            "similarityThreshold",
            "similarity threshold out of range",
            "a number in [0, 1]",
            request.similarity_threshold.to_string(),
        ));
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::from_issues(issues))
    }
}

/// Validate resolved filters and lower them to SQL parameters. Lists must be
/// non-empty and homogeneous; every column must pass the identifier pattern.
fn compile_filters(
    filters: &BTreeMap<String, FilterValue>,
) -> Result<Vec<(String, SqlValue)>, ValidationError> {
    let mut issues = Vec::new();
    let mut compiled = Vec::with_capacity(filters.len());

    for (column, value) in filters {
        if !is_valid_identifier(column) {
            issues.push(ValidationIssue::new(
                column,
                "filter column is not a valid identifier",
                "an identifier matching ^[A-Za-z_][A-Za-z0-9_]*$",
                column.clone(),
            ));
            continue;
        }
        match value {
            FilterValue::Scalar(scalar) => {
                compiled.push((column.clone(), SqlValue::from_field(scalar)));
            }
            FilterValue::List(items) => match compile_list(column, items) {
                Ok(value) => compiled.push((column.clone(), value)),
                Err(issue) => issues.push(issue),
            },
        }
    }

    if issues.is_empty() {
        Ok(compiled)
    } else {
        Err(ValidationError::from_issues(issues))
    }
}

fn compile_list(column: &str, items: &[FieldValue]) -> Result<SqlValue, ValidationIssue> {
    let Some(first) = items.first() else {
        return Err(ValidationIssue::new(
            column,
            "filter list is empty",
            "at least one value",
            "empty list",
        ));
    };
    let expected = first.field_type();
    if items.iter().any(|item| item.field_type() != expected) {
        return Err(ValidationIssue::new(
            column,
            "filter list mixes value types",
            expected.name(),
            "mixed types",
        ));
    }
    Ok(match first {
        FieldValue::Text(_) => SqlValue::TextList(
            items
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        ),
        FieldValue::Integer(_) => SqlValue::IntegerList(
            items
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect(),
        ),
        FieldValue::Float(_) => SqlValue::FloatList(
            items
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Float(f) => Some(*f),
                    _ => None,
                })
                .collect(),
        ),
        FieldValue::Boolean(_) => SqlValue::BooleanList(
            items
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Boolean(b) => Some(*b),
                    _ => None,
                })
                .collect(),
        ),
        FieldValue::Timestamp(_) => SqlValue::TimestampList(
            items
                .iter()
                .filter_map(|v| match v {
                    FieldValue::Timestamp(dt) => Some(*dt),
                    _ => None,
                })
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn score_expressions_per_distance_function() {
        assert_eq!(
            DistanceFunction::Cosine.score_expression("embedding"),
            "(1 - (\"embedding\" <=> $1))"
        );
        assert_eq!(
            DistanceFunction::Euclidean.score_expression("embedding"),
            "(1 / (1 + (\"embedding\" <-> $1)))"
        );
        assert_eq!(
            DistanceFunction::InnerProduct.score_expression("vec"),
            "(-(\"vec\" <#> $1))"
        );
    }

    #[rstest]
    #[case("", 10, 0.5, false)]
    #[case("   ", 10, 0.5, false)]
    #[case("q", 0, 0.5, false)]
    #[case("q", 1001, 0.5, false)]
    #[case("q", 10, -0.1, false)]
    #[case("q", 10, 1.01, false)]
    #[case("q", 1, 0.0, true)]
    #[case("q", 1000, 1.0, true)]
    fn request_validation(
        #[case] question: &str,
        #[case] limit: u32,
        #[case] threshold: f64,
        #[case] ok: bool,
    ) {
        let request = SearchRequest::new(question, ())
            .with_limit(limit)
            .with_similarity_threshold(threshold);
        assert_eq!(validate_request(&request).is_ok(), ok);
    }

    #[test]
    fn filters_reject_invalid_columns() {
        let mut filters = BTreeMap::new();
        filters.insert(
            "path; DROP TABLE".to_string(),
            FilterValue::Scalar(FieldValue::Text("a".to_string())),
        );
        let err = compile_filters(&filters).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.issues[0].message.contains("identifier"));
    }

    #[test]
    fn filters_reject_empty_and_mixed_lists() {
        let mut filters = BTreeMap::new();
        filters.insert("path".to_string(), FilterValue::List(vec![]));
        assert!(compile_filters(&filters).is_err());

        filters.insert(
            "path".to_string(),
            FilterValue::List(vec![
                FieldValue::Text("a".to_string()),
                FieldValue::Integer(1),
            ]),
        );
        assert!(compile_filters(&filters).is_err());
    }

    #[test]
    fn filters_compile_scalars_and_lists() {
        let mut filters = BTreeMap::new();
        filters.insert(
            "path".to_string(),
            FilterValue::Scalar(FieldValue::Text("src/x.ts".to_string())),
        );
        filters.insert(
            "repository_index_db_id".to_string(),
            FilterValue::List(vec![FieldValue::Integer(1), FieldValue::Integer(2)]),
        );
        let compiled = compile_filters(&filters).unwrap();
        assert_eq!(compiled.len(), 2);
        assert!(matches!(compiled[0].1, SqlValue::Text(_)));
        assert!(matches!(compiled[1].1, SqlValue::IntegerList(_)));
    }
}

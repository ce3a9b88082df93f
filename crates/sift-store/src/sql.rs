//! Statement assembly and parameter binding.
//!
//! Identifiers reaching this module were validated at construction (or, for
//! filter columns, at request time) and are emitted quoted. Values never
//! appear in statement text; [`SqlValue`] owns them for the lifetime of the
//! call and hands out `ToSql` references. The one interpolated non-identifier
//! is the query `LIMIT`, a range-checked integer.

use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;

use sift_core::field::FieldValue;
use sift_core::identifier::quote_identifier;

/// An owned, typed SQL parameter.
#[derive(Debug)]
pub(crate) enum SqlValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    /// `chunk_index`, bound as `INTEGER`.
    ChunkIndex(i32),
    /// Embedding vector, bound through the pgvector codec.
    Vector(pgvector::Vector),
    TextList(Vec<String>),
    IntegerList(Vec<i64>),
    FloatList(Vec<f64>),
    BooleanList(Vec<bool>),
    TimestampList(Vec<DateTime<Utc>>),
}

impl SqlValue {
    pub(crate) fn from_field(value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(s) => Self::Text(s.clone()),
            FieldValue::Integer(i) => Self::Integer(*i),
            FieldValue::Float(f) => Self::Float(*f),
            FieldValue::Boolean(b) => Self::Boolean(*b),
            FieldValue::Timestamp(dt) => Self::Timestamp(*dt),
        }
    }

    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Text(v) => v,
            Self::Integer(v) => v,
            Self::Float(v) => v,
            Self::Boolean(v) => v,
            Self::Timestamp(v) => v,
            Self::ChunkIndex(v) => v,
            Self::Vector(v) => v,
            Self::TextList(v) => v,
            Self::IntegerList(v) => v,
            Self::FloatList(v) => v,
            Self::BooleanList(v) => v,
            Self::TimestampList(v) => v,
        }
    }
}

/// Borrow a parameter slice in the driver's shape.
pub(crate) fn bind(values: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(SqlValue::as_sql).collect()
}

/// `INSERT INTO "t" ("a", "b") VALUES ($1, $2)`
pub(crate) fn insert_statement(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        quote_identifier(table)
    )
}

/// `DELETE FROM "t" WHERE "a" = $1 AND "b" = $2`
pub(crate) fn delete_statement(table: &str, columns: &[&str]) -> String {
    let predicate = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_identifier(c), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("DELETE FROM {} WHERE {predicate}", quote_identifier(table))
}

/// One equality filter: `column = $n` or `column = ANY($n)` for lists.
pub(crate) struct Filter<'a> {
    pub column: &'a str,
    pub is_list: bool,
}

/// The similarity search statement.
///
/// `$1` is the query vector, `$2` the similarity threshold; filters bind
/// from `$3`. `score_expr` already references `$1`; `limit` was validated
/// against `[1, 1000]` by the caller.
pub(crate) fn search_statement(
    table: &str,
    select_columns: &[&str],
    score_expr: &str,
    filters: &[Filter<'_>],
    limit: u32,
) -> String {
    let mut select_list = select_columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    select_list.push_str(&format!(", {score_expr} AS similarity"));

    let mut predicate = format!("{score_expr} >= $2");
    for (i, filter) in filters.iter().enumerate() {
        let placeholder = i + 3;
        let column = quote_identifier(filter.column);
        if filter.is_list {
            predicate.push_str(&format!(" AND {column} = ANY(${placeholder})"));
        } else {
            predicate.push_str(&format!(" AND {column} = ${placeholder}"));
        }
    }

    format!(
        "SELECT {select_list} FROM {} WHERE {predicate} ORDER BY similarity DESC LIMIT {limit}",
        quote_identifier(table)
    )
}

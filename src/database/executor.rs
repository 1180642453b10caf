//! Read-only Postgres query execution

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::{QueryExecutor, QueryResult};
use crate::error::ExecutionError;
use crate::sql::{strip_comments, SqlSafetyValidator};

pub struct PgQueryExecutor {
    pool: PgPool,
    validator: SqlSafetyValidator,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            validator: SqlSafetyValidator::new(),
        }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryResult, ExecutionError> {
        self.validator.validate(sql)?;

        let stripped = strip_comments(sql);
        let query = stripped.trim().trim_end_matches(';').trim_end();
        let head = query.to_uppercase();
        if !(head.starts_with("SELECT") || head.starts_with("WITH")) {
            return Err(ExecutionError::NotReadOnly);
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM ({}) AS count_subquery", query);
        let total_count: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;

        let limited_sql = format!(
            "SELECT * FROM ({}) AS limited_subquery LIMIT {}",
            query, max_rows
        );
        debug!("Executing: {}", limited_sql);
        let rows = sqlx::query(&limited_sql).fetch_all(&mut *tx).await?;
        tx.rollback().await?;

        let rows: Vec<Map<String, JsonValue>> = rows.iter().map(row_to_json).collect();
        info!(
            total_count,
            returned = rows.len(),
            "Query executed in read-only transaction"
        );
        Ok(QueryResult { rows, total_count })
    }
}

fn row_to_json(row: &PgRow) -> Map<String, JsonValue> {
    use sqlx::{Column, TypeInfo};

    let mut map = Map::new();
    for column in row.columns() {
        let name = column.name();
        let value: Option<JsonValue> = match column.type_info().name() {
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .map(|s| json!(s)),
            "INT2" => row
                .try_get::<Option<i16>, _>(name)
                .ok()
                .flatten()
                .map(|i| json!(i)),
            "INT4" => row
                .try_get::<Option<i32>, _>(name)
                .ok()
                .flatten()
                .map(|i| json!(i)),
            "INT8" => row
                .try_get::<Option<i64>, _>(name)
                .ok()
                .flatten()
                .map(|i| json!(i)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(name)
                .ok()
                .flatten()
                .map(|f| json!(f)),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(name)
                .ok()
                .flatten()
                .map(|f| json!(f)),
            "NUMERIC" => row
                .try_get::<Option<rust_decimal::Decimal>, _>(name)
                .ok()
                .flatten()
                .map(|d| json!(d.to_string())),
            "BOOL" => row
                .try_get::<Option<bool>, _>(name)
                .ok()
                .flatten()
                .map(|b| json!(b)),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(name)
                .ok()
                .flatten()
                .map(|u| json!(u.to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(name).ok().flatten(),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .ok()
                .flatten()
                .map(|dt| json!(dt.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(name)
                .ok()
                .flatten()
                .map(|dt| json!(dt.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(name)
                .ok()
                .flatten()
                .map(|d| json!(d.to_string())),
            _ => None,
        };
        map.insert(name.to_string(), value.unwrap_or(JsonValue::Null));
    }
    map
}

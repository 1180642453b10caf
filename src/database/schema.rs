//! Schema introspection from `information_schema`

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::SchemaIntrospector;
use crate::error::ExecutionError;

pub struct PgSchemaIntrospector {
    pool: PgPool,
    schema: String,
}

impl PgSchemaIntrospector {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: "public".to_string(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: String,
}

#[async_trait]
impl SchemaIntrospector for PgSchemaIntrospector {
    async fn describe(&self, table_name: &str) -> Result<String, ExecutionError> {
        let columns: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT column_name::text AS column_name,
                   data_type::text AS data_type,
                   is_nullable::text AS is_nullable
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(&self.schema)
        .bind(table_name)
        .fetch_all(&self.pool)
        .await?;

        if columns.is_empty() {
            return Err(ExecutionError::UnknownTable(table_name.to_string()));
        }
        debug!("Introspected {} columns for {}", columns.len(), table_name);
        Ok(render_create_table(table_name, &columns))
    }
}

fn render_create_table(table_name: &str, columns: &[ColumnRow]) -> String {
    let lines: Vec<String> = columns
        .iter()
        .map(|c| {
            let null = if c.is_nullable == "NO" { " NOT NULL" } else { "" };
            format!("    {} {}{}", c.column_name, c.data_type.to_uppercase(), null)
        })
        .collect();
    format!("CREATE TABLE {} (\n{}\n);", table_name, lines.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_create_table() {
        let columns = vec![
            ColumnRow {
                column_name: "geography".into(),
                data_type: "text".into(),
                is_nullable: "YES".into(),
            },
            ColumnRow {
                column_name: "industry".into(),
                data_type: "character varying".into(),
                is_nullable: "NO".into(),
            },
        ];
        assert_eq!(
            render_create_table("icp_data", &columns),
            "CREATE TABLE icp_data (\n    geography TEXT,\n    industry CHARACTER VARYING NOT NULL\n);"
        );
    }
}

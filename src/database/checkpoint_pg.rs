//! Cross-process checkpoint store backed by a JSONB table

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::checkpoint::CheckpointStore;
use crate::error::CheckpointError;
use crate::workflow::WorkflowState;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS icp_checkpoints (
    thread_id TEXT PRIMARY KEY,
    state JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the checkpoint table if it does not exist
    pub async fn ensure_table(&self) -> Result<(), CheckpointError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        info!("Checkpoint table ready");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        let row: Option<(Json<serde_json::Value>,)> =
            sqlx::query_as("SELECT state FROM icp_checkpoints WHERE thread_id = $1")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(Json(value),)| {
            serde_json::from_value(value).map_err(|source| CheckpointError::Serde {
                thread_id: thread_id.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        let value = serde_json::to_value(state).map_err(|source| CheckpointError::Serde {
            thread_id: state.thread_id.clone(),
            source,
        })?;
        sqlx::query(
            r#"
            INSERT INTO icp_checkpoints (thread_id, state, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (thread_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.thread_id)
        .bind(Json(value))
        .execute(&self.pool)
        .await?;
        debug!(thread_id = %state.thread_id, "Saved checkpoint");
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        sqlx::query("DELETE FROM icp_checkpoints WHERE thread_id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

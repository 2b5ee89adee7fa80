//! Postgres-backed [`Store`] implementation.
//!
//! Uses runtime-checked `sqlx::query`/`query_as` rather than the
//! compile-time `query!`/`query_as!` macros, since those require a live
//! database (or a checked-in `.sqlx` cache) at *build* time — the
//! engine's own persistence contract is deliberately backend-agnostic,
//! so the SQL text is assembled and validated at call time instead.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    ElectronDependencyRecord, ElectronPatch, ElectronRecord, LatticePatch, LatticeRecord,
};
use crate::store::Store;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_lattice(&self, record: LatticeRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO lattices
                (dispatch_id, name, status, parent_dispatch_id, parent_node_id,
                 workflow_function, args, kwargs, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.dispatch_id)
        .bind(record.name)
        .bind(record.status)
        .bind(record.parent_dispatch_id)
        .bind(record.parent_node_id)
        .bind(record.workflow_function)
        .bind(record.args)
        .bind(record.kwargs)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_lattice(&self, dispatch_id: Uuid, patch: LatticePatch) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE lattices SET
                status = COALESCE($2, status),
                start_time = COALESCE($3, start_time),
                end_time = COALESCE($4, end_time),
                error = COALESCE($5, error),
                result = COALESCE($6, result)
            WHERE dispatch_id = $1
            "#,
        )
        .bind(dispatch_id)
        .bind(patch.status)
        .bind(patch.start_time)
        .bind(patch.end_time)
        .bind(patch.error)
        .bind(patch.result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lattice(&self, dispatch_id: Uuid) -> Result<LatticeRecord, DbError> {
        sqlx::query_as::<_, LatticeRecord>(
            r#"
            SELECT dispatch_id, name, status, start_time, end_time, error, result,
                   parent_dispatch_id, parent_node_id, workflow_function, args, kwargs, created_at
            FROM lattices WHERE dispatch_id = $1
            "#,
        )
        .bind(dispatch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    async fn delete_lattice(&self, dispatch_id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM lattices WHERE dispatch_id = $1")
            .bind(dispatch_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn insert_electrons(&self, electrons: Vec<ElectronRecord>) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for electron in electrons {
            sqlx::query(
                r#"
                INSERT INTO electrons (dispatch_id, node_id, name, status)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(electron.dispatch_id)
            .bind(electron.node_id)
            .bind(electron.name)
            .bind(electron.status)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_electron(
        &self,
        dispatch_id: Uuid,
        node_id: i64,
        patch: ElectronPatch,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE electrons SET
                start_time = COALESCE($3, start_time),
                end_time = COALESCE($4, end_time),
                status = COALESCE($5, status),
                output = COALESCE($6, output),
                error = COALESCE($7, error),
                stdout = COALESCE($8, stdout),
                stderr = COALESCE($9, stderr)
            WHERE dispatch_id = $1 AND node_id = $2
            "#,
        )
        .bind(dispatch_id)
        .bind(node_id)
        .bind(patch.start_time)
        .bind(patch.end_time)
        .bind(patch.status)
        .bind(patch.output)
        .bind(patch.error)
        .bind(patch.stdout)
        .bind(patch.stderr)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn get_electron(&self, dispatch_id: Uuid, node_id: i64) -> Result<ElectronRecord, DbError> {
        sqlx::query_as::<_, ElectronRecord>(
            r#"
            SELECT dispatch_id, node_id, name, status, start_time, end_time,
                   output, error, stdout, stderr
            FROM electrons WHERE dispatch_id = $1 AND node_id = $2
            "#,
        )
        .bind(dispatch_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)
    }

    async fn get_electron_field(
        &self,
        dispatch_id: Uuid,
        node_id: i64,
        key: &str,
    ) -> Result<serde_json::Value, DbError> {
        let column = match key {
            "name" | "status" | "error" | "stdout" | "stderr" | "output" => key,
            other => return Err(DbError::Sqlx(sqlx::Error::ColumnNotFound(other.to_string()))),
        };

        let row = sqlx::query(&format!(
            "SELECT {column} FROM electrons WHERE dispatch_id = $1 AND node_id = $2"
        ))
        .bind(dispatch_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        if column == "output" {
            Ok(row.try_get::<Option<serde_json::Value>, _>(0)?.unwrap_or(serde_json::Value::Null))
        } else {
            Ok(row
                .try_get::<Option<String>, _>(0)?
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null))
        }
    }

    async fn insert_dependencies(&self, deps: Vec<ElectronDependencyRecord>) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        for dep in deps {
            sqlx::query(
                r#"
                INSERT INTO electron_dependencies
                    (dispatch_id, parent_node_id, child_node_id, edge_name, param_kind, arg_index)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(dep.dispatch_id)
            .bind(dep.parent_node_id)
            .bind(dep.child_node_id)
            .bind(dep.edge_name)
            .bind(dep.param_kind)
            .bind(dep.arg_index)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

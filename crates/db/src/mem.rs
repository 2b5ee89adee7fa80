//! In-memory [`Store`] implementation. The default backing for engine
//! tests and for the CLI when no `DATABASE_URL` is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    ElectronDependencyRecord, ElectronPatch, ElectronRecord, LatticePatch, LatticeRecord,
};
use crate::store::Store;

#[derive(Default)]
pub struct MemStore {
    lattices: RwLock<HashMap<Uuid, LatticeRecord>>,
    electrons: RwLock<HashMap<(Uuid, i64), ElectronRecord>>,
    dependencies: RwLock<Vec<ElectronDependencyRecord>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_lattice(&self, record: LatticeRecord) -> Result<(), DbError> {
        self.lattices.write().await.insert(record.dispatch_id, record);
        Ok(())
    }

    async fn update_lattice(&self, dispatch_id: Uuid, patch: LatticePatch) -> Result<(), DbError> {
        let mut lattices = self.lattices.write().await;
        let record = lattices.get_mut(&dispatch_id).ok_or(DbError::NotFound)?;
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(start_time) = patch.start_time {
            record.start_time = Some(start_time);
        }
        if let Some(end_time) = patch.end_time {
            record.end_time = Some(end_time);
        }
        if let Some(error) = patch.error {
            record.error = Some(error);
        }
        if let Some(result) = patch.result {
            record.result = Some(result);
        }
        Ok(())
    }

    async fn get_lattice(&self, dispatch_id: Uuid) -> Result<LatticeRecord, DbError> {
        self.lattices
            .read()
            .await
            .get(&dispatch_id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn delete_lattice(&self, dispatch_id: Uuid) -> Result<(), DbError> {
        self.lattices
            .write()
            .await
            .remove(&dispatch_id)
            .map(|_| ())
            .ok_or(DbError::NotFound)
    }

    async fn insert_electrons(&self, electrons: Vec<ElectronRecord>) -> Result<(), DbError> {
        let mut store = self.electrons.write().await;
        for electron in electrons {
            store.insert((electron.dispatch_id, electron.node_id), electron);
        }
        Ok(())
    }

    async fn update_electron(
        &self,
        dispatch_id: Uuid,
        node_id: i64,
        patch: ElectronPatch,
    ) -> Result<(), DbError> {
        let mut electrons = self.electrons.write().await;
        let record = electrons
            .get_mut(&(dispatch_id, node_id))
            .ok_or(DbError::NotFound)?;
        if let Some(v) = patch.start_time {
            record.start_time = Some(v);
        }
        if let Some(v) = patch.end_time {
            record.end_time = Some(v);
        }
        if let Some(v) = patch.status {
            record.status = v;
        }
        if let Some(v) = patch.output {
            record.output = Some(v);
        }
        if let Some(v) = patch.error {
            record.error = Some(v);
        }
        if let Some(v) = patch.stdout {
            record.stdout = Some(v);
        }
        if let Some(v) = patch.stderr {
            record.stderr = Some(v);
        }
        Ok(())
    }

    async fn get_electron(&self, dispatch_id: Uuid, node_id: i64) -> Result<ElectronRecord, DbError> {
        self.electrons
            .read()
            .await
            .get(&(dispatch_id, node_id))
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn get_electron_field(
        &self,
        dispatch_id: Uuid,
        node_id: i64,
        key: &str,
    ) -> Result<Value, DbError> {
        let record = self.get_electron(dispatch_id, node_id).await?;
        let value = match key {
            "name" => Value::String(record.name),
            "status" => Value::String(record.status),
            "output" => record.output.unwrap_or(Value::Null),
            "error" => record.error.map(Value::String).unwrap_or(Value::Null),
            "stdout" => record.stdout.map(Value::String).unwrap_or(Value::Null),
            "stderr" => record.stderr.map(Value::String).unwrap_or(Value::Null),
            other => return Err(DbError::Sqlx(sqlx::Error::ColumnNotFound(other.to_string()))),
        };
        Ok(value)
    }

    async fn insert_dependencies(&self, deps: Vec<ElectronDependencyRecord>) -> Result<(), DbError> {
        self.dependencies.write().await.extend(deps);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn lattice(dispatch_id: Uuid) -> LatticeRecord {
        LatticeRecord {
            dispatch_id,
            name: "test".into(),
            status: "CREATED".into(),
            start_time: None,
            end_time: None,
            error: None,
            result: None,
            parent_dispatch_id: None,
            parent_node_id: None,
            workflow_function: json!(null),
            args: json!([]),
            kwargs: json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_patch_then_get_round_trips() {
        let store = MemStore::new();
        let id = Uuid::new_v4();
        store.insert_lattice(lattice(id)).await.unwrap();

        store
            .update_lattice(id, LatticePatch { status: Some("RUNNING".into()), ..Default::default() })
            .await
            .unwrap();

        let record = store.get_lattice(id).await.unwrap();
        assert_eq!(record.status, "RUNNING");
    }

    #[tokio::test]
    async fn missing_lattice_is_not_found() {
        let store = MemStore::new();
        assert!(matches!(store.get_lattice(Uuid::new_v4()).await, Err(DbError::NotFound)));
    }
}

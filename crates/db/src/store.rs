//! The `Store` trait — the persistence interface the engine is written
//! against; the durable store's own schema is out of scope, only this
//! contract is. Two implementations ship with this crate:
//! [`crate::mem::MemStore`] (the engine's default, and what its tests
//! construct) and [`crate::postgres::PostgresStore`] (a concrete
//! `sqlx`-backed implementation).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    ElectronDependencyRecord, ElectronPatch, ElectronRecord, LatticePatch, LatticeRecord,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_lattice(&self, record: LatticeRecord) -> Result<(), DbError>;
    async fn update_lattice(&self, dispatch_id: Uuid, patch: LatticePatch) -> Result<(), DbError>;
    async fn get_lattice(&self, dispatch_id: Uuid) -> Result<LatticeRecord, DbError>;
    async fn delete_lattice(&self, dispatch_id: Uuid) -> Result<(), DbError>;

    async fn insert_electrons(&self, electrons: Vec<ElectronRecord>) -> Result<(), DbError>;
    async fn update_electron(
        &self,
        dispatch_id: Uuid,
        node_id: i64,
        patch: ElectronPatch,
    ) -> Result<(), DbError>;
    async fn get_electron(&self, dispatch_id: Uuid, node_id: i64) -> Result<ElectronRecord, DbError>;
    /// Read-through accessor for a single field, backing
    /// `ResultService::get_electron_attribute`'s store fallback once a
    /// dispatch has been finalized and dropped from the live registry.
    async fn get_electron_field(
        &self,
        dispatch_id: Uuid,
        node_id: i64,
        key: &str,
    ) -> Result<serde_json::Value, DbError>;

    async fn insert_dependencies(&self, deps: Vec<ElectronDependencyRecord>) -> Result<(), DbError>;
}

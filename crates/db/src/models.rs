//! Row structs for the persisted per-workflow "lattice", "electron", and
//! "electron-dependency" records.
//!
//! These types are the *interface* the engine is written against, not a
//! claim about how a production store indexes or partitions them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted workflow ("lattice") record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LatticeRecord {
    pub dispatch_id: Uuid,
    pub name: String,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub parent_dispatch_id: Option<Uuid>,
    pub parent_node_id: Option<i64>,
    /// Opaque serialized workflow function, as given at submission time.
    pub workflow_function: Value,
    pub args: Value,
    pub kwargs: Value,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied to a lattice record. `None` fields are left
/// untouched, mirroring `update_node_result`'s partial-update semantics
/// at the electron level.
#[derive(Debug, Clone, Default)]
pub struct LatticePatch {
    pub status: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
}

/// A persisted node ("electron") record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ElectronRecord {
    pub dispatch_id: Uuid,
    pub node_id: i64,
    pub name: String,
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Partial update applied to a single electron — field list matches
/// `update_node_result`'s signature.
#[derive(Debug, Clone, Default)]
pub struct ElectronPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// A persisted edge, carried for audit/visualisation purposes — the
/// engine keeps its own in-memory copy for scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ElectronDependencyRecord {
    pub dispatch_id: Uuid,
    pub parent_node_id: i64,
    pub child_node_id: i64,
    pub edge_name: String,
    pub param_kind: String,
    pub arg_index: Option<i32>,
}

//! Engine-level error taxonomy.

use thiserror::Error;
use uuid::Uuid;

use crate::models::NodeId;

/// Errors produced by the workflow engine.
///
/// Task-level failures (executor errors, dependency-materialisation
/// errors, sublattice non-completion) are *not* represented here — those
/// are recovered into a FAILED node-result and never unwind the loop.
/// Only the error classes that are allowed to reach a caller appear in
/// this enum: bad submissions, unknown dispatches, and persistence or
/// invariant failures the engine itself cannot recover from.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The submitted graph is malformed: duplicate node ids, edges to
    /// unknown nodes, a non-parameter node with no executor descriptor,
    /// or a gap/duplicate in a node's `arg_index` sequence. Fails the
    /// submission synchronously; no workflow is registered.
    #[error("invalid workflow submission: {0}")]
    Input(String),

    /// No live workflow is registered under this dispatch id.
    #[error("no live dispatch {0}")]
    UnknownDispatch(Uuid),

    /// A node id referenced by the caller (e.g. `get_electron_attribute`)
    /// does not exist in the workflow's graph.
    #[error("unknown node {node_id} in dispatch {dispatch_id}")]
    UnknownNode { dispatch_id: Uuid, node_id: NodeId },

    /// Persistence failure. The caller is expected to have already
    /// forced the affected node or workflow to FAILED before this
    /// propagates.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// An executor could not be constructed or resolved.
    #[error("executor error: {0}")]
    Executor(#[from] executors::ExecutorError),

    /// A genuine engine bug: a poisoned lock or an invariant the rest of
    /// this module assumes always holds. Only programming-error bugs in
    /// the engine itself are allowed to unwind to the caller.
    #[error("internal engine invariant violated: {0}")]
    Invariant(String),
}

//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and the [`Store`] trait
//! the engine is written against, plus two implementations: [`MemStore`]
//! (default, used by engine tests) and [`PostgresStore`]. No scheduling or
//! dispatch logic lives here.

pub mod error;
pub mod mem;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod store;

pub use error::DbError;
pub use mem::MemStore;
pub use models::{
    ElectronDependencyRecord, ElectronPatch, ElectronRecord, LatticePatch, LatticeRecord,
};
pub use pool::DbPool;
pub use postgres::PostgresStore;
pub use store::Store;

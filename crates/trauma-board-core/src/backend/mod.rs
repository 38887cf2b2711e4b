//! Persistence collaborator seam.
//!
//! The store talks to durable storage only through [`PatientBackend`]. An
//! in-memory backend serves tests and embedding; [`crate::db::Database`] is the
//! SQLite backend.

mod feed;
mod memory;

pub use feed::*;
pub use memory::*;

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use thiserror::Error;

use crate::db::DbError;
use crate::models::{Patient, PatientPatch};

/// Backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Record not found: {0}")]
    NotFound(i64),

    #[error("Duplicate id: {0}")]
    Duplicate(i64),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// A record store keyed by integer id with a change feed.
///
/// Each successful write publishes exactly one event and returns its feed
/// sequence number.
pub trait PatientBackend: Send {
    /// List every record.
    fn fetch_all(&self) -> BackendResult<Vec<Patient>>;

    /// Insert a record with a client-assigned id.
    fn insert(&self, patient: &Patient) -> BackendResult<u64>;

    /// Patch one or more attributes of a record.
    fn update(&self, id: i64, patch: &PatientPatch) -> BackendResult<u64>;

    fn delete(&self, id: i64) -> BackendResult<u64>;

    /// Receive every committed change from now on, including this client's own.
    fn subscribe(&self) -> Receiver<FeedEvent>;

    /// Highest id ever stored, deleted records included.
    fn high_water(&self) -> BackendResult<i64> {
        Ok(self
            .fetch_all()?
            .iter()
            .map(|p| p.id)
            .max()
            .unwrap_or(0))
    }
}

impl<T> PatientBackend for Arc<T>
where
    T: PatientBackend + Sync + ?Sized,
{
    fn fetch_all(&self) -> BackendResult<Vec<Patient>> {
        (**self).fetch_all()
    }

    fn insert(&self, patient: &Patient) -> BackendResult<u64> {
        (**self).insert(patient)
    }

    fn update(&self, id: i64, patch: &PatientPatch) -> BackendResult<u64> {
        (**self).update(id, patch)
    }

    fn delete(&self, id: i64) -> BackendResult<u64> {
        (**self).delete(id)
    }

    fn subscribe(&self) -> Receiver<FeedEvent> {
        (**self).subscribe()
    }

    fn high_water(&self) -> BackendResult<i64> {
        (**self).high_water()
    }
}

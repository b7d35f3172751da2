//! Error types for rendezvous server operations.

use crate::allocator::AllocError;
use crate::registrar::RegistrarError;
use thiserror::Error;

/// Errors that can occur during rendezvous server operation.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Allocation store failure or pool exhaustion.
    #[error("allocation failed: {0}")]
    Alloc(#[from] AllocError),
    /// A persisted slot no longer fits the configured pool.
    #[error("persisted slot {0} lies outside the configured pool")]
    StaleSlot(u64),
    /// External peer registration failed.
    #[error("peer registration failed: {0}")]
    Registrar(#[from] RegistrarError),
}

//! Persisted production run.
//!
//! The active run is written under the "line" namespace after every
//! committed mutation: one format byte followed by the postcard encoding
//! of [`ProductionRun`].  Decoded runs are structurally validated before
//! use; anything that fails is reported as a [`ConsistencyError`] so the
//! service can discard it and return to idle.

use log::debug;

use crate::app::ports::{StorageError, StoragePort};
use crate::error::ConsistencyError;
use crate::production::ProductionRun;

pub const RUN_NAMESPACE: &str = "line";
pub const RUN_KEY: &str = "run";

/// Leading byte of every stored run.
const FORMAT_VERSION: u8 = 1;

pub fn encode(run: &ProductionRun) -> Result<Vec<u8>, StorageError> {
    let mut bytes = vec![FORMAT_VERSION];
    let body = postcard::to_allocvec(run).map_err(|_| StorageError::IoError)?;
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode and validate stored bytes.  Never panics on arbitrary input.
pub fn decode(bytes: &[u8]) -> Result<ProductionRun, ConsistencyError> {
    let Some((&version, body)) = bytes.split_first() else {
        return Err(ConsistencyError::Undecodable);
    };
    if version != FORMAT_VERSION {
        return Err(ConsistencyError::Undecodable);
    }
    let run: ProductionRun =
        postcard::from_bytes(body).map_err(|_| ConsistencyError::Undecodable)?;
    run.validate()?;
    Ok(run)
}

/// Storage-backed slot for the single run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStore;

impl RunStore {
    pub fn save(&self, storage: &mut dyn StoragePort, run: &ProductionRun) -> Result<(), StorageError> {
        let bytes = encode(run)?;
        debug!("persisting run ({} bytes)", bytes.len());
        storage.write(RUN_NAMESPACE, RUN_KEY, &bytes)
    }

    /// `Ok(None)` when nothing is stored.
    pub fn load(&self, storage: &dyn StoragePort) -> Result<Option<ProductionRun>, ConsistencyError> {
        match storage.read(RUN_NAMESPACE, RUN_KEY) {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(StorageError::NotFound) => Ok(None),
            Err(_) => Err(ConsistencyError::Undecodable),
        }
    }

    pub fn clear(&self, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        storage.delete(RUN_NAMESPACE, RUN_KEY)
    }

    pub fn exists(&self, storage: &dyn StoragePort) -> bool {
        storage.exists(RUN_NAMESPACE, RUN_KEY)
    }
}

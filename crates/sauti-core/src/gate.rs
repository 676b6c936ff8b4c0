//! Admission control for synthesis calls
//!
//! One counting semaphore per checkpoints directory. Callers beyond the limit
//! queue; nobody is rejected. The semaphore table has its own lock, distinct
//! from the engine registry locks, and it is only held while looking up or
//! inserting an entry, never while waiting for a permit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::config::Settings;
use crate::error::{Error, Result};

/// Scoped admission token. Dropping it frees the slot.
#[derive(Debug)]
pub struct SynthesisPermit {
    key: PathBuf,
    _permit: OwnedSemaphorePermit,
}

impl Drop for SynthesisPermit {
    fn drop(&mut self) {
        trace!("Released synthesis permit for {:?}", self.key);
    }
}

/// Per-configuration synthesis semaphores
#[derive(Default)]
pub struct SynthesisGate {
    semaphores: Mutex<HashMap<PathBuf, Arc<Semaphore>>>,
}

impl SynthesisGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a synthesis slot for the configuration in `settings`
    pub async fn acquire(&self, settings: &Settings) -> Result<SynthesisPermit> {
        let key = settings.checkpoints_dir.clone();
        let semaphore = self.semaphore(settings);

        if semaphore.available_permits() == 0 {
            debug!("Synthesis gate for {:?} is full, queueing", key);
        }

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| Error::SynthesisFailed("synthesis gate closed".to_string()))?;

        trace!("Acquired synthesis permit for {:?}", key);
        Ok(SynthesisPermit {
            key,
            _permit: permit,
        })
    }

    /// Free slots for a configuration, `None` if it was never used
    pub fn available_permits(&self, settings: &Settings) -> Option<usize> {
        let semaphores = self
            .semaphores
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        semaphores
            .get(&settings.checkpoints_dir)
            .map(|s| s.available_permits())
    }

    /// Look up or create the semaphore. The first creation fixes the size.
    fn semaphore(&self, settings: &Settings) -> Arc<Semaphore> {
        let mut semaphores = self
            .semaphores
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        semaphores
            .entry(settings.checkpoints_dir.clone())
            .or_insert_with(|| {
                debug!(
                    "Creating synthesis gate for {:?} with {} slot(s)",
                    settings.checkpoints_dir,
                    settings.synthesis_limit()
                );
                Arc::new(Semaphore::new(settings.synthesis_limit()))
            })
            .clone()
    }
}

//! Dataset lifecycle.
//!
//! The engine dataset is loaded once, shared read-only across workers, and
//! released when the last owner lets go. The only synchronisation is at
//! start-up ([`DatasetCell::get_or_open`] loads under a lock) and teardown
//! (dropping a [`Worker`] decrements the attached-worker counter with a
//! bounded retry).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::directive::PropertyList;
use crate::dispatch::Worker;
use crate::engine::{DetectionEngine, EngineConfig, EngineLoader};
use crate::{ConfigError, DATASET_RESERVE_FACTOR, WORKER_RELEASE_ATTEMPTS};

/// A loaded engine plus the bookkeeping shared by its workers.
#[derive(Debug)]
pub struct Dataset<E> {
    engine: E,
    path: PathBuf,
    reserved: usize,
    value_separator: String,
    workers: AtomicUsize,
}

impl<E: DetectionEngine> Dataset<E> {
    /// Size and load the dataset named by `settings`.
    ///
    /// Returns `Ok(None)` when no data file is configured: the module stays
    /// inactive and every request passes through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyDataFile`] for an empty path and
    /// [`ConfigError::Dataset`] when the engine cannot size or load it.
    pub fn open<L>(
        loader: &L,
        settings: &Settings,
        properties: &PropertyList,
        workers: u16,
    ) -> Result<Option<Arc<Self>>, ConfigError>
    where
        L: EngineLoader<Engine = E>,
    {
        let Some(path) = settings.file_path.as_deref() else {
            info!("no data file configured, device detection is inactive");
            return Ok(None);
        };
        if path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataFile);
        }

        let config = EngineConfig::from_settings(settings, workers);
        let dataset_error = |source| ConfigError::Dataset {
            path: path.display().to_string(),
            source,
        };

        let size = loader
            .size_from_file(&config, properties, path)
            .map_err(dataset_error)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let reserved = (size as f64 * DATASET_RESERVE_FACTOR) as usize;
        debug!(size, reserved, "reserving dataset memory");

        let engine = loader
            .init_from_file(&config, properties, path)
            .map_err(dataset_error)?;
        info!(
            data_file = %path.display(),
            properties = properties.len(),
            "dataset loaded"
        );

        Ok(Some(Arc::new(Self {
            engine,
            path: path.to_path_buf(),
            reserved,
            value_separator: settings.value_separator.clone(),
            workers: AtomicUsize::new(0),
        })))
    }

    /// Wrap an already-loaded engine.
    pub fn from_engine(engine: E, path: impl Into<PathBuf>, value_separator: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            path: path.into(),
            reserved: 0,
            value_separator: value_separator.into(),
            workers: AtomicUsize::new(0),
        })
    }

    /// Attach a worker. The worker builds its response-header plan from
    /// the dataset's available properties.
    #[must_use]
    pub fn attach(self: &Arc<Self>) -> Worker<E> {
        self.workers.fetch_add(1, Ordering::AcqRel);
        Worker::new(Arc::clone(self))
    }

    /// Loaded engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Data file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes reserved for the dataset, reserve factor included.
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Separator between rendered property contributions.
    #[must_use]
    pub fn value_separator(&self) -> &str {
        &self.value_separator
    }
}

impl<E> Dataset<E> {
    /// Workers currently attached.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.load(Ordering::Acquire)
    }

    /// Decrement the attached-worker counter.
    ///
    /// Gives up after [`WORKER_RELEASE_ATTEMPTS`] lost races and reports
    /// whether the decrement landed.
    pub(crate) fn detach(&self) -> bool {
        for _ in 0..WORKER_RELEASE_ATTEMPTS {
            let current = self.workers.load(Ordering::Acquire);
            if current == 0 {
                return true;
            }
            if self
                .workers
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
        warn!(
            attempts = WORKER_RELEASE_ATTEMPTS,
            "failed to decrement the worker count"
        );
        false
    }
}

/// Process-wide slot holding the shared dataset.
///
/// The first caller of [`get_or_open`](Self::get_or_open) loads the dataset
/// under the lock; later callers share it.
#[derive(Debug)]
pub struct DatasetCell<E> {
    slot: Mutex<Option<Arc<Dataset<E>>>>,
}

impl<E> Default for DatasetCell<E> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<E: DetectionEngine> DatasetCell<E> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared dataset, loading it on first use.
    ///
    /// # Errors
    ///
    /// Propagates [`Dataset::open`] errors. A failed load leaves the slot
    /// empty.
    pub fn get_or_open<L>(
        &self,
        loader: &L,
        settings: &Settings,
        properties: &PropertyList,
        workers: u16,
    ) -> Result<Option<Arc<Dataset<E>>>, ConfigError>
    where
        L: EngineLoader<Engine = E>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(dataset) = slot.as_ref() {
            return Ok(Some(Arc::clone(dataset)));
        }
        let dataset = Dataset::open(loader, settings, properties, workers)?;
        *slot = dataset.clone();
        Ok(dataset)
    }

    /// Drop the shared dataset. Warns when workers are still attached.
    pub fn release(&self) -> Option<Arc<Dataset<E>>> {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dataset = slot.take()?;
        let attached = dataset.workers();
        if attached > 0 {
            warn!(workers = attached, "releasing dataset with workers still attached");
        }
        Some(dataset)
    }
}

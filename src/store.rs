//! JSON-file persistence for small process-wide values
//!
//! Load/save semantics only. The authorized-user list, the admin list and the
//! bot settings each live in one of these.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe handle to a JSON-backed value
#[derive(Clone)]
pub struct JsonStore<T> {
    path: Option<PathBuf>,
    value: Arc<Mutex<T>>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Open the file at `path`, creating it with the default value when missing.
    ///
    /// A file that exists but cannot be read or parsed is logged and replaced
    /// in memory by the default value; it is only overwritten on the next save.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let value = if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })
                .and_then(|raw| serde_json::from_str::<T>(&raw).map_err(StoreError::from))
            {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Failed to load store, starting empty");
                    T::default()
                }
            }
        } else {
            let value = T::default();
            write_json(&path, &value)?;
            value
        };

        Ok(Self {
            path: Some(path),
            value: Arc::new(Mutex::new(value)),
        })
    }

    /// A store that never touches the filesystem (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn in_memory(value: T) -> Self {
        Self {
            path: None,
            value: Arc::new(Mutex::new(value)),
        }
    }

    /// Read the current value
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate the value and persist it. The closure's result is returned
    /// even when nothing changed; the file is rewritten either way.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> StoreResult<R> {
        let mut guard = self.lock();
        let result = f(&mut guard);
        if let Some(path) = &self.path {
            write_json(path, &*guard)?;
        }
        Ok(result)
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        // A panic while holding the lock cannot leave a half-written value
        // behind: all mutations are single closure calls.
        self.value
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = serde_json::to_string_pretty(value)?;
    std::fs::write(path, raw).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

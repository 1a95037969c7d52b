//! Persisted proxy registry
//!
//! The registry owns the ordered list of proxies. Every successful mutation
//! rewrites the backing JSON file in full and publishes a fresh snapshot to
//! subscribers.

use crate::error::{PersistenceError, RegistryError, ValidationError};
use crate::proxy::models::ProxyRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Ordered, file-backed collection of proxy records
pub struct Registry {
    path: PathBuf,
    proxies: Vec<ProxyRecord>,
    changes: watch::Sender<Vec<ProxyRecord>>,
}

impl Registry {
    /// Load the registry from `path`
    ///
    /// A missing file yields an empty registry. Malformed content is an
    /// error and the file is left untouched.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        let proxies = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Vec<ProxyRecord>>(&content).map_err(
                |source| PersistenceError::Corrupt {
                    path: path.clone(),
                    source,
                },
            )?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No proxy list found, starting empty");
                Vec::new()
            }
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };

        debug!(path = %path.display(), count = proxies.len(), "Loaded proxy list");
        Ok(Self::with_proxies(path, proxies))
    }

    fn with_proxies(path: PathBuf, proxies: Vec<ProxyRecord>) -> Self {
        let (changes, _) = watch::channel(proxies.clone());
        Self {
            path,
            proxies,
            changes,
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current records in display order
    pub fn list(&self) -> &[ProxyRecord] {
        &self.proxies
    }

    pub fn get(&self, index: usize) -> Option<&ProxyRecord> {
        self.proxies.get(index)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Receive a snapshot after every mutation
    pub fn subscribe(&self) -> watch::Receiver<Vec<ProxyRecord>> {
        self.changes.subscribe()
    }

    /// Validate and append a proxy, then persist
    pub fn add(&mut self, address: &str, port: &str, kind: &str) -> Result<(), RegistryError> {
        let record = ProxyRecord::parse(address, port, kind)?;
        info!(proxy = %record, "Adding proxy");
        self.proxies.push(record);
        self.commit()
    }

    /// Remove the proxy at `index`, then persist
    pub fn delete(&mut self, index: Option<usize>) -> Result<ProxyRecord, RegistryError> {
        let index = index.ok_or(ValidationError::NoSelection)?;
        if index >= self.proxies.len() {
            return Err(ValidationError::IndexOutOfRange {
                index,
                len: self.proxies.len(),
            }
            .into());
        }

        let removed = self.proxies.remove(index);
        info!(proxy = %removed, index, "Deleted proxy");
        self.commit()?;
        Ok(removed)
    }

    /// Rewrite the backing file with the current records
    ///
    /// Writes to a sibling temporary file and renames it over the target.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let data = serde_json::to_string(&self.proxies).map_err(|source| {
            PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp = self.temp_path();
        let io_err = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, data).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        debug!(path = %self.path.display(), count = self.proxies.len(), "Saved proxy list");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn commit(&mut self) -> Result<(), RegistryError> {
        self.changes.send_replace(self.proxies.clone());
        self.save().map_err(|e| {
            warn!(error = %e, "Failed to persist proxy list");
            RegistryError::from(e)
        })
    }
}

//! Persisted allocator state
//!
//! Two pieces of state outlive the process:
//!
//! - the **exclusion list**: a flat JSON array of the channels currently bound
//! - the **pairing ledger**: pending and assigned pairs with their submission
//!   counts
//!
//! Both sit behind the [`Repository`] trait so the allocator never touches
//! files directly. [`JsonFileStore`] replaces its file wholesale on every save
//! (write to a temp file, then rename) and serialises all file access in the
//! process through one lock.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use wave_table::io::atomic_write;
use wave_table::Channel;

use crate::error::StoreError;
use crate::state::{PairKey, PairingState};

/// Default file name of the exclusion list
pub const EXCLUSION_FILE: &str = "exclusion_list.json";

/// Default file name of the pairing ledger
pub const LEDGER_FILE: &str = "pairings.json";

/// Process-wide lock over repository file access
static FILE_LOCK: Mutex<()> = Mutex::new(());

fn file_lock() -> MutexGuard<'static, ()> {
    // The lock guards no data, so a poisoned lock is still usable
    FILE_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Load/save access to one persisted value
pub trait Repository<T>: Send {
    /// Read the current value; a missing store yields the default
    fn load(&self) -> Result<T, StoreError>;

    /// Replace the stored value; on failure the previous value stays intact
    fn save(&self, value: &T) -> Result<(), StoreError>;
}

/// Channels currently bound to a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionList(Vec<Channel>);

impl ExclusionList {
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut list = Self::default();
        for channel in channels {
            list.insert(channel);
        }
        list
    }

    /// Add a channel; returns false if it was already listed
    pub fn insert(&mut self, channel: Channel) -> bool {
        if self.contains(channel) {
            return false;
        }
        self.0.push(channel);
        true
    }

    /// Remove every occurrence of a channel; returns true if any was removed
    pub fn remove(&mut self, channel: Channel) -> bool {
        let before = self.0.len();
        self.0.retain(|&c| c != channel);
        self.0.len() != before
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0.contains(&channel)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Channels in insertion order
    pub fn channels(&self) -> &[Channel] {
        &self.0
    }

    pub fn to_set(&self) -> BTreeSet<Channel> {
        self.0.iter().copied().collect()
    }
}

/// One persisted pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRecord {
    pub pair: PairKey,
    #[serde(flatten)]
    pub state: PairingState,
}

/// Snapshot of all known pairs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingLedger {
    /// Known pairs, ordered by key
    pub pairs: Vec<PairRecord>,
    /// Pairs waiting for a channel, oldest first
    #[serde(default)]
    pub waiting: Vec<PairKey>,
}

/// JSON file repository
///
/// A missing file, a blank one, or one holding only the empty JSON string
/// `""` (what older deployments wrote to clear the list) loads as the default.
/// Anything else that does not parse is [`StoreError::Corrupt`].
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Repository<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> Result<T, StoreError> {
        let _guard = file_lock();

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, starting empty", self.path.display());
                return Ok(T::default());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let content = content.trim();
        if content.is_empty() || content == "\"\"" {
            return Ok(T::default());
        }

        serde_json::from_str(content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        let json =
            serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let _guard = file_lock();
        atomic_write(&self.path, |w| std::io::Write::write_all(w, &json))?;
        trace!("Wrote {} bytes to {}", json.len(), self.path.display());
        Ok(())
    }
}

/// In-memory repository, for tests and ephemeral runs
pub struct MemoryStore<T> {
    value: Mutex<T>,
}

impl<T: Default> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(T::default()),
        }
    }
}

impl<T> MemoryStore<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }
}

impl<T: Clone + Send> Repository<T> for MemoryStore<T> {
    fn load(&self) -> Result<T, StoreError> {
        let value = self.value.lock().unwrap_or_else(|e| e.into_inner());
        Ok(value.clone())
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        let mut stored = self.value.lock().unwrap_or_else(|e| e.into_inner());
        *stored = value.clone();
        Ok(())
    }
}

impl<T, R> Repository<T> for std::sync::Arc<R>
where
    R: Repository<T> + Sync + ?Sized,
{
    fn load(&self) -> Result<T, StoreError> {
        (**self).load()
    }

    fn save(&self, value: &T) -> Result<(), StoreError> {
        (**self).save(value)
    }
}

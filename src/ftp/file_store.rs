//! # File store
//!
//! Shared in-memory mapping of stored filenames to byte content

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Mapping from filename (case-sensitive) to file content. Mutated only by STOR (or
/// the test-facing seeding helper), read by RETR/LIST/NLST and by test assertions.
/// Cloning shares the underlying map, so sessions and data channels all see the same
/// files.
#[derive(Debug, Default, Clone)]
pub(crate) struct FileStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl FileStore {
    pub fn insert(&self, name: String, content: Vec<u8>) {
        trace!("storing {name} ({} bytes)", content.len());
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, content);
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All stored filenames, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

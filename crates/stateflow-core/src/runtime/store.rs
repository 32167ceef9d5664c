// stateflow-core/src/runtime/store.rs
// ============================================================================
// Module: Stateflow In-Memory History Store
// Description: Simple in-memory keyed history store for tests and demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of
//! [`HistoryStore`] for tests and local demos. It is not intended for
//! production use; the durable implementation lives in the SQLite store
//! crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::identifiers::HistoryItemId;
use crate::interfaces::HistoryStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Guarded record map plus the closed marker.
#[derive(Debug, Default)]
struct StoreState {
    /// Serialized records by item id.
    records: BTreeMap<String, serde_json::Value>,
    /// Set once the store was closed.
    closed: bool,
}

/// In-memory history store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistoryStore {
    /// Record map protected by a mutex.
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryHistoryStore {
    /// Creates a new in-memory history store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the mutex is poisoned.
    pub fn records(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("history store mutex poisoned".to_string()))?;
        Ok(guard.records.clone())
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn put(&self, key: &HistoryItemId, record: &serde_json::Value) -> Result<(), StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("history store mutex poisoned".to_string()))?;
        if guard.closed {
            return Err(StoreError::Closed);
        }
        guard.records.insert(key.as_str().to_string(), record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("history store mutex poisoned".to_string()))?;
        guard.closed = true;
        Ok(())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared history store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedHistoryStore {
    /// Inner store implementation.
    inner: Arc<dyn HistoryStore>,
}

impl SharedHistoryStore {
    /// Wraps a history store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl HistoryStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            inner: store,
        }
    }

    /// Returns the shared trait object.
    #[must_use]
    pub fn as_arc(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.inner)
    }
}

impl HistoryStore for SharedHistoryStore {
    fn put(&self, key: &HistoryItemId, record: &serde_json::Value) -> Result<(), StoreError> {
        self.inner.put(key, record)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush()
    }

    fn close(&self) -> Result<(), StoreError> {
        self.inner.close()
    }
}

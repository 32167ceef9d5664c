// stateflow-core/src/core/observer.rs
// ============================================================================
// Module: Stateflow Observer Registry
// Description: Weak-reference registry dispatching model-change events.
// Purpose: Relay before/after notification pairs to aggregate consumers.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Every machine-level mutation emits a before/after notification pair. The
//! registry holds observers weakly, so dropping an observer unsubscribes it;
//! dead entries are pruned during emission.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::core::validate::StructureError;
use crate::interfaces::ModelEvent;
use crate::interfaces::Observer;

// ============================================================================
// SECTION: Observer Registry
// ============================================================================

/// Weak-reference observer registry owned by a state machine.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    /// Subscribed observers; dead entries are pruned at emit time.
    observers: Mutex<Vec<Weak<dyn Observer>>>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes an observer without taking ownership.
    pub fn subscribe(&self, observer: &Arc<dyn Observer>) {
        if let Ok(mut guard) = self.observers.lock() {
            guard.push(Arc::downgrade(observer));
        }
    }

    /// Emits a before notification.
    pub fn notify_before(&self, event: &ModelEvent) {
        self.for_each_live(|observer| observer.on_before(event));
    }

    /// Emits an after notification with the mutation result.
    pub fn notify_after(&self, event: &ModelEvent, error: Option<&StructureError>) {
        self.for_each_live(|observer| observer.on_after(event, error));
    }

    /// Invokes `call` on every live observer and prunes dead entries.
    fn for_each_live(&self, call: impl Fn(&Arc<dyn Observer>)) {
        let Ok(mut guard) = self.observers.lock() else {
            return;
        };
        guard.retain(|weak| {
            weak.upgrade().inspect(|observer| call(observer)).is_some()
        });
    }
}

// ============================================================================
// SECTION: Dirty Flag Observer
// ============================================================================

/// Observer flagging a machine dirty on every successful mutation.
#[derive(Debug, Default)]
pub struct DirtyFlagObserver {
    /// Set once any mutation succeeds.
    dirty: AtomicBool,
}

impl DirtyFlagObserver {
    /// Creates a clean dirty-flag observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a mutation succeeded since the last reset.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Resets the flag, e.g. after saving.
    pub fn reset(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

impl Observer for DirtyFlagObserver {
    fn on_after(&self, _event: &ModelEvent, error: Option<&StructureError>) {
        if error.is_none() {
            self.dirty.store(true, Ordering::Release);
        }
    }
}

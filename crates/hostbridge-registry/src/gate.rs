//! Construction gating.
//!
//! A class whose constructor is gated can only be instantiated by the bridge.
//! The bridge opens the class's [`ConstructionGate`] with a [`ConstructorMode`]
//! guard for the duration of the instantiation; script calling the
//! constructor at any other time gets "Illegal constructor".
//!
//! ```ignore
//! {
//!     let _mode = ConstructorMode::enter(&gate);
//!     isolate.instantiate(class, &[])?; // permitted
//! } // gate closed again, also on the error path
//! ```

use std::cell::Cell;
use std::rc::Rc;

/// Per-class permission flag for the gated constructor entry point.
#[derive(Debug, Clone, Default)]
pub struct ConstructionGate {
    open: Rc<Cell<bool>>,
}

impl ConstructionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether internal construction is currently permitted.
    pub fn is_open(&self) -> bool {
        self.open.get()
    }
}

/// Scoped guard holding a gate open.
///
/// Restores the previous state on drop.
#[derive(Debug)]
#[must_use = "the gate closes as soon as the guard is dropped"]
pub struct ConstructorMode {
    gate: ConstructionGate,
    previous: bool,
}

impl ConstructorMode {
    /// Open `gate` until the returned guard is dropped.
    pub fn enter(gate: &ConstructionGate) -> Self {
        let previous = gate.open.replace(true);
        log::trace!("construction gate opened");
        Self {
            gate: gate.clone(),
            previous,
        }
    }
}

impl Drop for ConstructorMode {
    fn drop(&mut self) {
        self.gate.open.set(self.previous);
        log::trace!("construction gate closed");
    }
}

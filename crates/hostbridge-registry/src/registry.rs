//! Class registry.
//!
//! Maps class identity to its [`ClassDescriptor`] and construction gate, and
//! the global namespace to exposed classes. Owned by an [`Isolate`](crate::Isolate);
//! there is no process-wide state, so independent isolates never see each
//! other's registrations.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use hostbridge_core::{Dynamic, ObjectHeap, RegistrationError, TypeHash};

use crate::class::ClassDescriptor;
use crate::gate::ConstructionGate;
use crate::native_fn::NativeFn;

/// A registered class.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    descriptor: Rc<ClassDescriptor>,
    parent: Option<TypeHash>,
    gate: ConstructionGate,
    registration: u32,
}

impl ClassEntry {
    pub fn descriptor(&self) -> &Rc<ClassDescriptor> {
        &self.descriptor
    }

    pub fn parent(&self) -> Option<TypeHash> {
        self.parent
    }

    pub fn gate(&self) -> &ConstructionGate {
        &self.gate
    }

    /// Unique per `initialize`; a re-registered class gets a new one.
    pub fn registration(&self) -> u32 {
        self.registration
    }
}

/// Registry of initialized classes.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: FxHashMap<TypeHash, ClassEntry>,
    globals: FxHashMap<String, TypeHash>,
    last_registration: u32,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class.
    ///
    /// Returns `Ok(false)` without changes if the class is already registered.
    ///
    /// # Errors
    ///
    /// - `EmptyName` if the class has no name
    /// - `UnknownParent` if the base class is not registered
    /// - `DuplicateGlobal` if another class owns the global name
    pub fn initialize(&mut self, descriptor: ClassDescriptor) -> Result<bool, RegistrationError> {
        let hash = descriptor.hash();
        if self.classes.contains_key(&hash) {
            return Ok(false);
        }
        if descriptor.name().is_empty() {
            return Err(RegistrationError::EmptyName);
        }

        let parent = match descriptor.parent() {
            Some(parent) => {
                let parent_hash = TypeHash::from_name(parent);
                if !self.classes.contains_key(&parent_hash) {
                    log::warn!("class '{}' inherits from unknown '{}'", descriptor.name(), parent);
                    return Err(RegistrationError::UnknownParent {
                        class: descriptor.name().to_string(),
                        parent: parent.to_string(),
                    });
                }
                Some(parent_hash)
            }
            None => None,
        };

        if descriptor.expose_global() {
            if self.globals.contains_key(descriptor.name()) {
                return Err(RegistrationError::DuplicateGlobal {
                    name: descriptor.name().to_string(),
                });
            }
            self.globals.insert(descriptor.name().to_string(), hash);
        }

        self.last_registration += 1;
        log::debug!(
            "initialized class '{}' (registration {})",
            descriptor.name(),
            self.last_registration
        );
        self.classes.insert(
            hash,
            ClassEntry {
                descriptor: Rc::new(descriptor),
                parent,
                gate: ConstructionGate::new(),
                registration: self.last_registration,
            },
        );
        Ok(true)
    }

    /// Release a class so it can be registered again later.
    ///
    /// Returns false if it was not registered.
    pub fn uninitialize(&mut self, class: TypeHash) -> bool {
        let Some(entry) = self.classes.remove(&class) else {
            return false;
        };
        if entry.descriptor.expose_global() {
            self.globals.remove(entry.descriptor.name());
        }
        log::debug!("uninitialized class '{}'", entry.descriptor.name());
        true
    }

    pub fn is_initialized(&self, class: TypeHash) -> bool {
        self.classes.contains_key(&class)
    }

    pub fn get(&self, class: TypeHash) -> Option<&ClassEntry> {
        self.classes.get(&class)
    }

    /// Look up an exposed class by its global name.
    pub fn lookup_global(&self, name: &str) -> Option<TypeHash> {
        self.globals.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Walk `class` and its registered ancestors.
    fn lineage(&self, class: TypeHash) -> impl Iterator<Item = &ClassEntry> {
        std::iter::successors(self.classes.get(&class), move |entry| {
            entry.parent.and_then(|parent| self.classes.get(&parent))
        })
    }

    /// Check whether `class` is `ancestor` or inherits from it.
    pub fn is_subclass(&self, class: TypeHash, ancestor: TypeHash) -> bool {
        self.is_initialized(ancestor) && self.lineage(class).any(|entry| entry.descriptor.hash() == ancestor)
    }

    /// Find a method on `class` or the nearest ancestor declaring it.
    pub fn find_method(&self, class: TypeHash, name: &str) -> Option<NativeFn> {
        self.lineage(class)
            .find_map(|entry| entry.descriptor.method(name).cloned())
    }

    /// Find a constant on `class` or the nearest ancestor declaring it.
    pub fn find_constant(&self, class: TypeHash, name: &str) -> Option<Dynamic> {
        self.lineage(class)
            .find_map(|entry| entry.descriptor.constant(name).cloned())
    }

    /// Structural instance check.
    ///
    /// Only looks at the class the object was instantiated from, never at its
    /// internal slot, so it is safe on disposed objects. Objects built under an
    /// earlier registration of their class do not match.
    pub fn has_instance(&self, heap: &ObjectHeap, value: &Dynamic, class: TypeHash) -> bool {
        value
            .as_object()
            .and_then(|handle| heap.get(handle))
            .is_some_and(|object| {
                self.classes
                    .get(&object.class())
                    .is_some_and(|entry| entry.registration == object.registration())
                    && self.is_subclass(object.class(), class)
            })
    }
}

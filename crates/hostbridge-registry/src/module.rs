//! Native module: a named group of classes installed together.

use hostbridge_core::RegistrationError;

use crate::Isolate;
use crate::class::ClassDescriptor;

/// A named set of class registrations.
///
/// Classes are initialized in insertion order, so a base class must be
/// added before the classes that inherit from it.
///
/// # Example
///
/// ```ignore
/// let module = Module::new("typed_array")
///     .class(array_buffer_class())
///     .class(view_base_class())
///     .class(view_class(ElementKind::Float32));
/// module.install(&mut isolate)?;
/// ```
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    classes: Vec<ClassDescriptor>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    /// Add a class.
    pub fn class(mut self, descriptor: ClassDescriptor) -> Self {
        self.classes.push(descriptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classes(&self) -> &[ClassDescriptor] {
        &self.classes
    }

    /// Initialize every class in the isolate.
    pub fn install(&self, isolate: &mut Isolate) -> Result<(), RegistrationError> {
        for class in &self.classes {
            isolate.initialize(class.clone())?;
        }
        log::debug!("installed module '{}' ({} classes)", self.name, self.classes.len());
        Ok(())
    }

    /// Uninitialize every class, derived classes first.
    pub fn uninstall(&self, isolate: &mut Isolate) {
        for class in self.classes.iter().rev() {
            isolate.uninitialize(class.hash());
        }
        log::debug!("uninstalled module '{}'", self.name);
    }
}

use rustc_hash::FxHashMap;

use hostbridge_registry::DEFAULT_MAX_BUFFER_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextProperty {
    /// Live object capacity of the host heap; 0 is unlimited
    MaxHeapObjects,
    /// Largest buffer in bytes
    MaxBufferLength,
    /// Non-zero: deliver pending finalizers at teardown
    FinalizeOnTeardown,
    /// Extra collection cycles a grouped (non-independent) weak entry survives
    GroupedFinalizerDelay,
}

impl ContextProperty {
    pub const ALL: [ContextProperty; 4] = [
        ContextProperty::MaxHeapObjects,
        ContextProperty::MaxBufferLength,
        ContextProperty::FinalizeOnTeardown,
        ContextProperty::GroupedFinalizerDelay,
    ];

    pub fn default_value(&self) -> usize {
        match self {
            ContextProperty::MaxHeapObjects => 0,
            ContextProperty::MaxBufferLength => DEFAULT_MAX_BUFFER_LENGTH,
            ContextProperty::FinalizeOnTeardown => 0,
            ContextProperty::GroupedFinalizerDelay => 1,
        }
    }
}

/// Property values of a context; unset properties read as their default.
#[derive(Debug, Clone, Default)]
pub struct ContextProperties {
    values: FxHashMap<ContextProperty, usize>,
}

impl ContextProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: ContextProperty) -> usize {
        self.values
            .get(&property)
            .copied()
            .unwrap_or_else(|| property.default_value())
    }

    pub fn set(&mut self, property: ContextProperty, value: usize) {
        self.values.insert(property, value);
    }

    /// Restore every property to its default.
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_properties_read_defaults() {
        let properties = ContextProperties::new();
        for property in ContextProperty::ALL {
            assert_eq!(properties.get(property), property.default_value());
        }
        assert_eq!(properties.get(ContextProperty::MaxBufferLength), u32::MAX as usize);
    }

    #[test]
    fn set_and_reset() {
        let mut properties = ContextProperties::new();
        properties.set(ContextProperty::MaxHeapObjects, 64);
        assert_eq!(properties.get(ContextProperty::MaxHeapObjects), 64);
        properties.reset();
        assert_eq!(properties.get(ContextProperty::MaxHeapObjects), 0);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use granite_error::{DbError, Result};

use crate::collation::Collator;
use crate::values::ScalarValue;

/// Identifier for an externally owned value binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

/// Externally owned bindings visible to operators during `open`.
///
/// The environment belongs to the surrounding engine for the whole query.
/// Operators read correlated bindings (seek keys, collation) from it only
/// at a well-defined point, inside `open`, never mid-iteration. The
/// driver may rebind a slot between reopens to feed a correlated
/// re-execution.
#[derive(Debug, Default)]
pub struct QueryEnv {
    slots: HashMap<SlotId, ScalarValue>,
    collation: Option<Arc<dyn Collator>>,
}

impl QueryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind or rebind an external slot.
    pub fn bind_slot(&mut self, slot: SlotId, value: ScalarValue) {
        self.slots.insert(slot, value);
    }

    pub fn slot(&self, slot: SlotId) -> Result<&ScalarValue> {
        self.slots
            .get(&slot)
            .ok_or_else(|| DbError::new("unbound slot").with_field("slot", slot.0))
    }

    pub fn set_collation(&mut self, collation: Arc<dyn Collator>) {
        self.collation = Some(collation);
    }

    /// Ambient collation handle, if one is bound for this query.
    pub fn collation(&self) -> Option<Arc<dyn Collator>> {
        self.collation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_a_slot_replaces_its_value() {
        let mut env = QueryEnv::new();
        env.bind_slot(SlotId(4), ScalarValue::Int64(5));
        assert_eq!(&ScalarValue::Int64(5), env.slot(SlotId(4)).unwrap());

        env.bind_slot(SlotId(4), ScalarValue::Int64(6));
        assert_eq!(&ScalarValue::Int64(6), env.slot(SlotId(4)).unwrap());
    }

    #[test]
    fn unbound_slot_errors() {
        let env = QueryEnv::new();
        assert!(env.slot(SlotId(9)).is_err());
    }
}

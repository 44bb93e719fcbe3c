//! Identity memo table for one encode session

use deeppickle_vm::{ObjId, Value};
use rustc_hash::FxHashMap;

use crate::error::EncodeError;

/// Maps object identity to the stream slot holding it.
///
/// Slots are assigned in order, matching the decoder's `MEMOIZE`. Each entry
/// keeps its value alive so an address cannot be reused mid-session.
#[derive(Default)]
pub struct MemoTable {
    slots: FxHashMap<ObjId, (u64, Value)>,
}

impl MemoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of an already stored value; primitives are never memoized
    pub fn lookup(&self, value: &Value) -> Option<u64> {
        let id = value.id()?;
        self.slots.get(&id).map(|(slot, _)| *slot)
    }

    /// Assign the next slot to `value`
    pub fn reserve(&mut self, value: &Value) -> Result<u64, EncodeError> {
        let id = value.id().ok_or_else(|| {
            EncodeError::Internal(format!("cannot memoize {} value", value.kind_name()))
        })?;
        let slot = self.slots.len() as u64;
        if self.slots.contains_key(&id) {
            return Err(EncodeError::Internal(format!(
                "{} value memoized twice",
                value.kind_name()
            )));
        }
        self.slots.insert(id, (slot, value.clone()));
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_slots_by_identity() {
        let mut memo = MemoTable::new();
        let a = Value::list(vec![]);
        let b = Value::list(vec![]);
        assert_eq!(memo.reserve(&a).unwrap(), 0);
        assert_eq!(memo.reserve(&b).unwrap(), 1);
        assert_eq!(memo.lookup(&a.clone()), Some(0));
        assert_eq!(memo.lookup(&b), Some(1));
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn test_double_reserve_is_internal_error() {
        let mut memo = MemoTable::new();
        let a = Value::empty_dict();
        memo.reserve(&a).unwrap();
        assert!(matches!(memo.reserve(&a), Err(EncodeError::Internal(_))));
    }

    #[test]
    fn test_primitives_have_no_slot() {
        let mut memo = MemoTable::new();
        assert_eq!(memo.lookup(&Value::Int(1)), None);
        assert!(memo.reserve(&Value::str("x")).is_err());
    }
}

//! Insertion-ordered dict and set

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::ExecResult;
use crate::value::{ObjId, Value};

/// Hashable projection of a value
///
/// Numbers that compare equal share a key (`True`, `1` and `1.0`), tuples and
/// frozensets hash structurally, every other heap value hashes by identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<HashKey>),
    FrozenSet(Vec<HashKey>),
    Identity(ObjId),
}

/// Insertion-ordered mapping from hashable values to values
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: FxHashMap<HashKey, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let mut dict = Self::new();
        for (k, v) in pairs {
            dict.set_str(k, v);
        }
        dict
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> ExecResult<Option<Value>> {
        let hk = key.hash_key()?;
        Ok(self.index.get(&hk).map(|&i| self.entries[i].1.clone()))
    }

    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.index
            .get(&HashKey::Str(Rc::from(key)))
            .map(|&i| self.entries[i].1.clone())
    }

    pub fn contains_key(&self, key: &Value) -> ExecResult<bool> {
        Ok(self.index.contains_key(&key.hash_key()?))
    }

    pub fn contains_str(&self, key: &str) -> bool {
        self.index.contains_key(&HashKey::Str(Rc::from(key)))
    }

    /// Insert or replace; an existing key object is kept
    pub fn insert(&mut self, key: Value, value: Value) -> ExecResult<Option<Value>> {
        let hk = key.hash_key()?;
        Ok(self.insert_keyed(hk, key, value))
    }

    pub fn set_str(&mut self, key: &str, value: Value) -> Option<Value> {
        let key: Rc<str> = Rc::from(key);
        self.insert_keyed(HashKey::Str(key.clone()), Value::Str(key), value)
    }

    fn insert_keyed(&mut self, hk: HashKey, key: Value, value: Value) -> Option<Value> {
        match self.index.get(&hk) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(hk, self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &Value) -> ExecResult<Option<Value>> {
        let hk = key.hash_key()?;
        Ok(self.remove_keyed(&hk))
    }

    pub fn remove_str(&mut self, key: &str) -> Option<Value> {
        self.remove_keyed(&HashKey::Str(Rc::from(key)))
    }

    fn remove_keyed(&mut self, hk: &HashKey) -> Option<Value> {
        let i = self.index.remove(hk)?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Copy every entry of `other` into `self`
    pub fn update(&mut self, other: &Dict) {
        for (key, value) in &other.entries {
            // keys of an existing dict are hashable by construction
            if let Ok(hk) = key.hash_key() {
                self.insert_keyed(hk, key.clone(), value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl fmt::Debug for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Insertion-ordered set of hashable values
#[derive(Clone, Default, Debug)]
pub struct ValueSet {
    inner: Dict,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> ExecResult<Self> {
        let mut set = Self::new();
        for v in values {
            set.add(v)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn add(&mut self, value: Value) -> ExecResult<()> {
        if !self.inner.contains_key(&value)? {
            self.inner.insert(value, Value::None)?;
        }
        Ok(())
    }

    pub fn contains(&self, value: &Value) -> ExecResult<bool> {
        self.inner.contains_key(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.inner.keys()
    }
}

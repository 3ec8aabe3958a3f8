use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A many-to-many association with O(1) lookup from either side.
///
/// Invariant: the set of `(k, v)` pairs reachable through the forward index
/// is exactly the set reachable through the reverse index.
/// [`Self::check_integrity`] verifies this; mutation paths preserve it by
/// always touching both indices together.
#[derive(Debug, Clone)]
pub struct BidiMultiMap<K, V> {
    forward: HashMap<K, HashSet<V>>,
    reverse: HashMap<V, HashSet<K>>,
}

impl<K, V> Default for BidiMultiMap<K, V> {
    fn default() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }
}

impl<K, V> BidiMultiMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the pair. Returns `true` iff it was not already present.
    pub fn put(&mut self, key: K, value: V) -> bool {
        let inserted = self
            .forward
            .entry(key.clone())
            .or_default()
            .insert(value.clone());
        if inserted {
            self.reverse.entry(value).or_default().insert(key);
        }
        inserted
    }

    /// Removes one pair. Returns `true` iff it was present.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.forward.get_mut(key) else {
            return false;
        };
        if !values.remove(value) {
            return false;
        }
        if values.is_empty() {
            self.forward.remove(key);
        }

        if let Some(keys) = self.reverse.get_mut(value) {
            keys.remove(key);
            if keys.is_empty() {
                self.reverse.remove(value);
            }
        }
        true
    }

    /// Removes every pair with this key. Returns `true` iff any was removed.
    pub fn remove_key(&mut self, key: &K) -> bool {
        let Some(values) = self.forward.remove(key) else {
            return false;
        };
        for value in &values {
            if let Some(keys) = self.reverse.get_mut(value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.reverse.remove(value);
                }
            }
        }
        true
    }

    /// Removes every pair with this value. Returns `true` iff any was removed.
    pub fn remove_value(&mut self, value: &V) -> bool {
        let Some(keys) = self.reverse.remove(value) else {
            return false;
        };
        for key in &keys {
            if let Some(values) = self.forward.get_mut(key) {
                values.remove(value);
                if values.is_empty() {
                    self.forward.remove(key);
                }
            }
        }
        true
    }

    /// Values associated with `key`, as an owned set (empty if none).
    pub fn values_of(&self, key: &K) -> HashSet<V> {
        self.forward.get(key).cloned().unwrap_or_default()
    }

    /// Keys associated with `value`, as an owned set (empty if none).
    pub fn keys_of(&self, value: &V) -> HashSet<K> {
        self.reverse.get(value).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.reverse.contains_key(value)
    }

    pub fn contains_pair(&self, key: &K, value: &V) -> bool {
        self.forward
            .get(key)
            .is_some_and(|values| values.contains(value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.forward.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.reverse.keys()
    }

    pub fn key_count(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Empties both directions.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// Verifies forward/reverse symmetry, describing the first violation.
    pub fn check_integrity(&self) -> Result<(), String>
    where
        K: std::fmt::Debug,
        V: std::fmt::Debug,
    {
        for (key, values) in &self.forward {
            if values.is_empty() {
                return Err(format!("forward index holds empty set for key {key:?}"));
            }
            for value in values {
                let ok = self
                    .reverse
                    .get(value)
                    .is_some_and(|keys| keys.contains(key));
                if !ok {
                    return Err(format!(
                        "pair ({key:?}, {value:?}) present forward but not reverse"
                    ));
                }
            }
        }
        for (value, keys) in &self.reverse {
            if keys.is_empty() {
                return Err(format!("reverse index holds empty set for value {value:?}"));
            }
            for key in keys {
                let ok = self
                    .forward
                    .get(key)
                    .is_some_and(|values| values.contains(value));
                if !ok {
                    return Err(format!(
                        "pair ({key:?}, {value:?}) present reverse but not forward"
                    ));
                }
            }
        }
        Ok(())
    }
}

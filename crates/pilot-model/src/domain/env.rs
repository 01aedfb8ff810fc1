use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Extra environment a task command runs with.
///
/// Kept as an ordered list: later entries shadow earlier ones, which lets the
/// executor layer its own `PILOT_*` variables over whatever the producer supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Env(pub Vec<KeyValue>);

impl Env {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Resolve `key`, last entry wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Builder-style [`Env::push`].
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(key, value);
        self
    }

    /// Concatenate `other` after `self`; its entries shadow ours.
    pub fn merged(&self, other: &Env) -> Env {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        Env(out)
    }
}

impl FromIterator<KeyValue> for Env {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        Env(iter.into_iter().collect())
    }
}

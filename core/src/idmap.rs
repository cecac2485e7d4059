use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bidirectional mapping between string keys and dense ids.
///
/// Ids are assigned in first-seen order starting at 0 and never reused.
/// Only the ordered key list is persisted; the reverse table is rebuilt on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IdMap {
    id_to_key: Vec<String>,
    key_to_id: HashMap<String, u32>,
}

impl IdMap {
    pub fn new() -> Self { Self::default() }

    /// Return the id for `key`, assigning the next free id if unseen.
    pub fn get_or_insert(&mut self, key: &str) -> u32 {
        if let Some(&id) = self.key_to_id.get(key) {
            return id;
        }
        let id = self.id_to_key.len() as u32;
        self.id_to_key.push(key.to_string());
        self.key_to_id.insert(key.to_string(), id);
        id
    }

    pub fn id(&self, key: &str) -> Option<u32> { self.key_to_id.get(key).copied() }

    pub fn key(&self, id: u32) -> Option<&str> { self.id_to_key.get(id as usize).map(String::as_str) }

    pub fn contains(&self, key: &str) -> bool { self.key_to_id.contains_key(key) }

    pub fn len(&self) -> usize { self.id_to_key.len() }

    pub fn is_empty(&self) -> bool { self.id_to_key.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.id_to_key.iter().map(String::as_str) }
}

impl From<Vec<String>> for IdMap {
    fn from(keys: Vec<String>) -> Self {
        let mut map = IdMap::new();
        for key in &keys {
            map.get_or_insert(key);
        }
        map
    }
}

impl From<IdMap> for Vec<String> {
    fn from(map: IdMap) -> Self { map.id_to_key }
}

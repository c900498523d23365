//! Objects: a short association list that turns into a hash map once it
//! outgrows [`SMALL_CAPACITY`] entries.

use indexmap::IndexMap;

use super::{HashKey, Value};

pub const SMALL_CAPACITY: usize = 8;

type Map = IndexMap<HashKey, Value, ahash::RandomState>;

#[derive(Debug, Clone)]
enum Repr {
    Small(Vec<(HashKey, Value)>),
    Map(Map),
}

#[derive(Debug, Clone)]
pub struct Object {
    repr: Repr,
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl Object {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let repr = if capacity > SMALL_CAPACITY {
            Repr::Map(Map::with_capacity_and_hasher(
                capacity,
                ahash::RandomState::new(),
            ))
        } else {
            Repr::Small(Vec::with_capacity(SMALL_CAPACITY))
        };
        Self { repr }
    }

    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        match &self.repr {
            Repr::Small(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            Repr::Map(map) => map.get(key),
        }
    }

    /// Insert or update.
    pub fn set(&mut self, key: HashKey, value: Value) {
        match &mut self.repr {
            Repr::Small(entries) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                } else if entries.len() < SMALL_CAPACITY {
                    entries.push((key, value));
                } else {
                    let mut map =
                        Map::with_capacity_and_hasher(SMALL_CAPACITY * 2, ahash::RandomState::new());
                    map.extend(entries.drain(..));
                    map.insert(key, value);
                    self.repr = Repr::Map(map);
                }
            }
            Repr::Map(map) => {
                map.insert(key, value);
            }
        }
    }

    pub fn remove(&mut self, key: &HashKey) -> Option<Value> {
        match &mut self.repr {
            Repr::Small(entries) => {
                let pos = entries.iter().position(|(k, _)| k == key)?;
                Some(entries.swap_remove(pos).1)
            }
            Repr::Map(map) => map.swap_remove(key),
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Small(entries) => entries.len(),
            Repr::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_map(&self) -> bool {
        matches!(self.repr, Repr::Map(_))
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (&HashKey, &Value)> + '_> {
        match &self.repr {
            Repr::Small(entries) => Box::new(entries.iter().map(|(k, v)| (k, v))),
            Repr::Map(map) => Box::new(map.iter()),
        }
    }
}

impl FromIterator<(HashKey, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (HashKey, Value)>>(iter: I) -> Self {
        let mut object = Object::new();
        for (key, value) in iter {
            object.set(key, value);
        }
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: i64) -> HashKey {
        HashKey::Int(n)
    }

    #[test]
    fn test_set_updates_existing_key() {
        let mut obj = Object::new();
        obj.set(key(1), Value::Int(10));
        obj.set(key(1), Value::Int(20));
        assert_eq!(obj.len(), 1);
        assert!(matches!(obj.get(&key(1)), Some(Value::Int(20))));
    }

    #[test]
    fn test_promotes_past_small_capacity() {
        let mut obj = Object::new();
        for i in 0..SMALL_CAPACITY as i64 {
            obj.set(key(i), Value::Int(i));
        }
        assert!(!obj.is_map());
        obj.set(key(100), Value::Nil);
        assert!(obj.is_map());
        assert_eq!(obj.len(), SMALL_CAPACITY + 1);
        assert!(matches!(obj.get(&key(3)), Some(Value::Int(3))));
    }

    #[test]
    fn test_remove_really_removes() {
        let mut obj = Object::new();
        obj.set(HashKey::from("a"), Value::Int(1));
        obj.set(HashKey::from("b"), Value::Int(2));
        assert!(obj.remove(&HashKey::from("a")).is_some());
        assert_eq!(obj.len(), 1);
        assert!(obj.get(&HashKey::from("a")).is_none());
        assert!(obj.remove(&HashKey::from("a")).is_none());

        let mut big: Object = (0..20).map(|i| (key(i), Value::Int(i))).collect();
        big.remove(&key(5));
        assert_eq!(big.len(), 19);
        assert!(big.get(&key(5)).is_none());
    }
}

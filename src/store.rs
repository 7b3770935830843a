use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::commands::CommandError;

/// The in-memory keyspace behind the default commands. Every key holds a string, a hash or a
/// list. The store is cheap to clone; clones share the same keyspace.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<HashMap<Bytes, Value>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    Hash(HashMap<Bytes, Bytes>),
    List(VecDeque<Bytes>),
}

/// Which end of a list to push to or pop from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum End {
    Front,
    Back,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    /// Locks the keyspace. A lock poisoned by a panicking command is taken over as is, since every
    /// operation leaves the map consistent before it can panic.
    pub fn lock(&self) -> StoreLocked<'_> {
        StoreLocked {
            keys: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

pub struct StoreLocked<'a> {
    keys: MutexGuard<'a, HashMap<Bytes, Value>>,
}

impl StoreLocked<'_> {
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.keys.keys()
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.keys.contains_key(key)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.keys.remove(key)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, CommandError> {
        match self.keys.get(key) {
            Some(Value::String(data)) => Ok(Some(data.clone())),
            Some(_) => Err(CommandError::WrongType),
            None => Ok(None),
        }
    }

    /// Overwrites the key whatever it held before.
    pub fn set(&mut self, key: Bytes, data: Bytes) {
        self.keys.insert(key, Value::String(data));
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>, CommandError> {
        match self.keys.get(key) {
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(CommandError::WrongType),
            None => Ok(None),
        }
    }

    /// Sets the given fields and returns how many of them did not exist yet.
    pub fn hset(
        &mut self,
        key: Bytes,
        fields: impl IntoIterator<Item = (Bytes, Bytes)>,
    ) -> Result<usize, CommandError> {
        let hash = match self
            .keys
            .entry(key)
            .or_insert_with(|| Value::Hash(HashMap::new()))
        {
            Value::Hash(hash) => hash,
            _ => return Err(CommandError::WrongType),
        };

        Ok(fields
            .into_iter()
            .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
            .count())
    }

    pub fn hgetall(&self, key: &[u8]) -> Result<HashMap<Bytes, Bytes>, CommandError> {
        match self.keys.get(key) {
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(CommandError::WrongType),
            None => Ok(HashMap::new()),
        }
    }

    /// Pushes the values one by one and returns the length of the list afterwards.
    pub fn push(&mut self, key: Bytes, values: Vec<Bytes>, end: End) -> Result<usize, CommandError> {
        let list = match self
            .keys
            .entry(key)
            .or_insert_with(|| Value::List(VecDeque::new()))
        {
            Value::List(list) => list,
            _ => return Err(CommandError::WrongType),
        };

        for value in values {
            match end {
                End::Front => list.push_front(value),
                End::Back => list.push_back(value),
            }
        }
        Ok(list.len())
    }

    /// Pops one value. A list left empty is removed.
    pub fn pop(&mut self, key: &[u8], end: End) -> Result<Option<Bytes>, CommandError> {
        let list = match self.keys.get_mut(key) {
            Some(Value::List(list)) => list,
            Some(_) => return Err(CommandError::WrongType),
            None => return Ok(None),
        };

        let value = match end {
            End::Front => list.pop_front(),
            End::Back => list.pop_back(),
        };
        if list.is_empty() {
            self.keys.remove(key);
        }
        Ok(value)
    }

    pub fn llen(&self, key: &[u8]) -> Result<usize, CommandError> {
        match self.keys.get(key) {
            Some(Value::List(list)) => Ok(list.len()),
            Some(_) => Err(CommandError::WrongType),
            None => Ok(0),
        }
    }

    /// Values between `start` and `stop`, both inclusive. Negative indices count from the end.
    pub fn range(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, CommandError> {
        let list = match self.keys.get(key) {
            Some(Value::List(list)) => list,
            Some(_) => return Err(CommandError::WrongType),
            None => return Ok(vec![]),
        };

        let len = list.len() as i64;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };

        if start > stop || start >= len {
            return Ok(vec![]);
        }

        Ok(list
            .range(start as usize..=stop as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&'static str]) -> Vec<Bytes> {
        items.iter().map(|item| Bytes::from_static(item.as_bytes())).collect()
    }

    #[test]
    fn strings() {
        let store = Store::new();
        let mut store = store.lock();

        assert_eq!(store.get(b"key").unwrap(), None);

        store.set(Bytes::from("key"), Bytes::from("value"));
        assert_eq!(store.get(b"key").unwrap(), Some(Bytes::from("value")));
        assert!(store.exists(b"key"));
        assert_eq!(store.size(), 1);

        assert!(store.remove(b"key").is_some());
        assert!(!store.exists(b"key"));
    }

    #[test]
    fn hashes() {
        let store = Store::new();
        let mut store = store.lock();

        let added = store
            .hset(
                Bytes::from("hash"),
                vec![
                    (Bytes::from("a"), Bytes::from("1")),
                    (Bytes::from("b"), Bytes::from("2")),
                ],
            )
            .unwrap();
        assert_eq!(added, 2);

        let added = store
            .hset(Bytes::from("hash"), vec![(Bytes::from("a"), Bytes::from("3"))])
            .unwrap();
        assert_eq!(added, 0);

        assert_eq!(store.hget(b"hash", b"a").unwrap(), Some(Bytes::from("3")));
        assert_eq!(store.hget(b"hash", b"c").unwrap(), None);
        assert_eq!(store.hgetall(b"hash").unwrap().len(), 2);
        assert!(store.hgetall(b"missing").unwrap().is_empty());
    }

    #[test]
    fn lists() {
        let store = Store::new();
        let mut store = store.lock();

        assert_eq!(store.push(Bytes::from("list"), values(&["b", "c"]), End::Back).unwrap(), 2);
        assert_eq!(store.push(Bytes::from("list"), values(&["a"]), End::Front).unwrap(), 3);
        assert_eq!(store.llen(b"list").unwrap(), 3);
        assert_eq!(store.range(b"list", 0, -1).unwrap(), values(&["a", "b", "c"]));

        assert_eq!(store.pop(b"list", End::Front).unwrap(), Some(Bytes::from("a")));
        assert_eq!(store.pop(b"list", End::Back).unwrap(), Some(Bytes::from("c")));
        assert_eq!(store.pop(b"list", End::Back).unwrap(), Some(Bytes::from("b")));

        // The emptied list is gone.
        assert!(!store.exists(b"list"));
        assert_eq!(store.pop(b"list", End::Back).unwrap(), None);
        assert_eq!(store.llen(b"list").unwrap(), 0);
    }

    #[test]
    fn range_indices() {
        let store = Store::new();
        let mut store = store.lock();
        store
            .push(Bytes::from("list"), values(&["a", "b", "c", "d"]), End::Back)
            .unwrap();

        assert_eq!(store.range(b"list", 1, 2).unwrap(), values(&["b", "c"]));
        assert_eq!(store.range(b"list", -2, -1).unwrap(), values(&["c", "d"]));
        assert_eq!(store.range(b"list", -100, 100).unwrap(), values(&["a", "b", "c", "d"]));
        assert!(store.range(b"list", 3, 1).unwrap().is_empty());
        assert!(store.range(b"list", 4, 10).unwrap().is_empty());
        assert!(store.range(b"list", 0, -5).unwrap().is_empty());
        assert!(store.range(b"missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn wrong_type() {
        let store = Store::new();
        let mut store = store.lock();
        store.set(Bytes::from("string"), Bytes::from("value"));
        store
            .push(Bytes::from("list"), values(&["a"]), End::Back)
            .unwrap();

        assert!(matches!(store.get(b"list"), Err(CommandError::WrongType)));
        assert!(matches!(store.hget(b"string", b"a"), Err(CommandError::WrongType)));
        assert!(matches!(
            store.push(Bytes::from("string"), values(&["a"]), End::Front),
            Err(CommandError::WrongType)
        ));
        assert!(matches!(store.llen(b"string"), Err(CommandError::WrongType)));

        // SET replaces any type.
        store.set(Bytes::from("list"), Bytes::from("now a string"));
        assert_eq!(store.get(b"list").unwrap(), Some(Bytes::from("now a string")));
    }
}

use bytes::Bytes;
use glob_match::glob_match;
use itertools::Itertools;

use super::DefaultHandler;
use crate::request::Request;

impl DefaultHandler {
    // https://redis.io/commands/del
    pub(super) fn del(&self, _request: &Request, key: Bytes, keys: Vec<Bytes>) -> usize {
        let mut store = self.store.lock();

        std::iter::once(key)
            .chain(keys)
            .filter(|key| store.remove(key).is_some())
            .count()
    }

    /// A key given several times is counted several times.
    pub(super) fn exists(&self, _request: &Request, key: Bytes, keys: Vec<Bytes>) -> usize {
        let store = self.store.lock();

        std::iter::once(key)
            .chain(keys)
            .filter(|key| store.exists(key))
            .count()
    }

    // https://redis.io/commands/keys
    pub(super) fn keys(&self, _request: &Request, pattern: String) -> Vec<Bytes> {
        self.store
            .lock()
            .keys()
            .filter(|key| glob_match(&pattern, &String::from_utf8_lossy(key)))
            .cloned()
            .sorted()
            .collect()
    }
}

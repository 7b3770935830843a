use bytes::Bytes;

use super::DefaultHandler;
use crate::commands::CommandError;
use crate::request::Request;

impl DefaultHandler {
    // https://redis.io/commands/get
    pub(super) fn get(&self, _request: &Request, key: Bytes) -> Result<Option<Bytes>, CommandError> {
        self.store.lock().get(&key)
    }

    // https://redis.io/commands/set
    pub(super) fn set(&self, _request: &Request, key: Bytes, value: Bytes) {
        self.store.lock().set(key, value);
    }
}

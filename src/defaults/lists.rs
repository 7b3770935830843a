use bytes::Bytes;

use super::DefaultHandler;
use crate::commands::CommandError;
use crate::request::Request;
use crate::store::End;

impl DefaultHandler {
    // https://redis.io/commands/lpush
    pub(super) fn lpush(
        &self,
        _request: &Request,
        key: Bytes,
        value: Bytes,
        values: Vec<Bytes>,
    ) -> Result<usize, CommandError> {
        self.push(key, value, values, End::Front)
    }

    // https://redis.io/commands/rpush
    pub(super) fn rpush(
        &self,
        _request: &Request,
        key: Bytes,
        value: Bytes,
        values: Vec<Bytes>,
    ) -> Result<usize, CommandError> {
        self.push(key, value, values, End::Back)
    }

    pub(super) fn lpop(&self, _request: &Request, key: Bytes) -> Result<Option<Bytes>, CommandError> {
        self.store.lock().pop(&key, End::Front)
    }

    pub(super) fn rpop(&self, _request: &Request, key: Bytes) -> Result<Option<Bytes>, CommandError> {
        self.store.lock().pop(&key, End::Back)
    }

    pub(super) fn llen(&self, _request: &Request, key: Bytes) -> Result<usize, CommandError> {
        self.store.lock().llen(&key)
    }

    // https://redis.io/commands/lrange
    pub(super) fn lrange(
        &self,
        _request: &Request,
        key: Bytes,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Bytes>, CommandError> {
        self.store.lock().range(&key, start, stop)
    }

    fn push(
        &self,
        key: Bytes,
        value: Bytes,
        mut values: Vec<Bytes>,
        end: End,
    ) -> Result<usize, CommandError> {
        values.insert(0, value);
        self.store.lock().push(key, values, end)
    }
}

use bytes::Bytes;
use std::collections::HashMap;

use super::DefaultHandler;
use crate::commands::CommandError;
use crate::request::Request;

impl DefaultHandler {
    // https://redis.io/commands/hget
    pub(super) fn hget(
        &self,
        _request: &Request,
        key: Bytes,
        field: Bytes,
    ) -> Result<Option<Bytes>, CommandError> {
        self.store.lock().hget(&key, &field)
    }

    /// `HSET key field value [field value ...]`, replies with the number of fields added.
    pub(super) fn hset(
        &self,
        request: &Request,
        key: Bytes,
        field: Bytes,
        value: Bytes,
        rest: Vec<Bytes>,
    ) -> Result<usize, CommandError> {
        if rest.len() % 2 != 0 {
            return Err(CommandError::WrongArity(request.name().to_lowercase()));
        }

        let mut fields = vec![(field, value)];
        let mut rest = rest.into_iter();
        while let (Some(field), Some(value)) = (rest.next(), rest.next()) {
            fields.push((field, value));
        }

        self.store.lock().hset(key, fields)
    }

    // https://redis.io/commands/hgetall
    pub(super) fn hgetall(
        &self,
        _request: &Request,
        key: Bytes,
    ) -> Result<HashMap<Bytes, Bytes>, CommandError> {
        self.store.lock().hgetall(&key)
    }
}

//! A ready-made command set over an in-memory keyspace, enough for common clients and tools to talk
//! to the server.

mod connection;
mod hashes;
mod keys;
mod lists;
mod strings;

use crate::commands::{Registry, Service};
use crate::store::Store;

#[derive(Clone, Default)]
pub struct DefaultHandler {
    store: Store,
}

impl DefaultHandler {
    pub fn new() -> DefaultHandler {
        DefaultHandler::default()
    }

    pub fn with_store(store: Store) -> DefaultHandler {
        DefaultHandler { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Service for DefaultHandler {
    fn commands(registry: &mut Registry<Self>) {
        registry
            .method("ping", Self::ping)
            .method("echo", Self::echo)
            .method("select", Self::select)
            .method("client", Self::client)
            .method("command", Self::command)
            .method("monitor", Self::monitor)
            .method("get", Self::get)
            .method("set", Self::set)
            .method("del", Self::del)
            .method("exists", Self::exists)
            .method("keys", Self::keys)
            .method("hget", Self::hget)
            .method("hset", Self::hset)
            .method("hgetall", Self::hgetall)
            .method("lpush", Self::lpush)
            .method("rpush", Self::rpush)
            .method("lpop", Self::lpop)
            .method("rpop", Self::rpop)
            .method("llen", Self::llen)
            .method("lrange", Self::lrange);
    }
}

use bytes::Bytes;

use super::DefaultHandler;
use crate::commands::CommandError;
use crate::reply::Reply;
use crate::request::Request;

impl DefaultHandler {
    // https://redis.io/commands/ping
    pub(super) fn ping(&self, _request: &Request, message: Option<Bytes>) -> Reply {
        match message {
            Some(message) => Reply::Bulk(message),
            None => Reply::status("PONG"),
        }
    }

    // https://redis.io/commands/echo
    pub(super) fn echo(&self, _request: &Request, message: Bytes) -> Bytes {
        message
    }

    /// There is a single database.
    pub(super) fn select(&self, _request: &Request, index: i64) -> Result<(), CommandError> {
        match index {
            0 => Ok(()),
            _ => Err(CommandError::err("DB index is out of range")),
        }
    }

    /// Accepted and ignored, clients send `CLIENT SETNAME` and `CLIENT SETINFO` on connect.
    pub(super) fn client(&self, _request: &Request, _args: Vec<Bytes>) {}

    pub(super) fn command(&self, _request: &Request, _args: Vec<Bytes>) -> Vec<Reply> {
        vec![]
    }

    // https://redis.io/commands/monitor
    pub(super) fn monitor(&self, request: &Request) -> Result<(), CommandError> {
        request.start_monitor()
    }
}

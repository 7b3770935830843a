use bytes::Bytes;
use std::str;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::commands::CommandError;
use crate::monitor::{Monitor, Subscription};

/// One decoded command invocation.
///
/// The decoder produces the name and arguments; the session then attaches its own metadata before
/// dispatching the request to a handler.
#[derive(Debug, Clone)]
pub struct Request {
    name: String,
    args: Vec<Bytes>,
    session: Arc<SessionInfo>,
}

impl Request {
    pub fn new(name: String, args: Vec<Bytes>) -> Request {
        Request {
            name,
            args,
            session: Arc::new(SessionInfo::detached()),
        }
    }

    /// The command name exactly as the client sent it.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn arguments(&self) -> Arguments<'_> {
        Arguments::new(&self.name, &self.args)
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    /// The remote address of the client, `unix:<path>` for Unix-domain sockets.
    pub fn peer(&self) -> &str {
        &self.session.peer
    }

    /// Cancelled once the connection that sent this request is closing.
    pub fn closed(&self) -> &CancellationToken {
        &self.session.closed
    }

    /// Switches the connection into monitor mode once the reply to this request has been written.
    pub fn start_monitor(&self) -> Result<(), CommandError> {
        let monitor = self
            .session
            .monitor
            .as_ref()
            .ok_or_else(|| CommandError::err("MONITOR is not available on this connection"))?;

        let mut pending = self
            .session
            .pending_monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pending.is_none() {
            *pending = Some(monitor.subscribe());
        }
        Ok(())
    }

    pub(crate) fn attach(&mut self, session: &Arc<SessionInfo>) {
        self.session = session.clone();
    }
}

/// Per-connection metadata shared by every request of a session.
#[derive(Debug)]
pub struct SessionInfo {
    id: Uuid,
    peer: String,
    closed: CancellationToken,
    monitor: Option<Monitor>,
    pending_monitor: Mutex<Option<Subscription>>,
}

impl SessionInfo {
    pub(crate) fn new(peer: String, monitor: Monitor) -> SessionInfo {
        SessionInfo {
            id: Uuid::new_v4(),
            peer,
            closed: CancellationToken::new(),
            monitor: Some(monitor),
            pending_monitor: Mutex::new(None),
        }
    }

    fn detached() -> SessionInfo {
        SessionInfo {
            id: Uuid::nil(),
            peer: String::new(),
            closed: CancellationToken::new(),
            monitor: None,
            pending_monitor: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    pub(crate) fn take_monitor(&self) -> Option<Subscription> {
        self.pending_monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// A cursor over the arguments of a request, used to convert them into typed values.
#[derive(Debug)]
pub struct Arguments<'a> {
    command: &'a str,
    parts: std::slice::Iter<'a, Bytes>,
}

impl<'a> Arguments<'a> {
    pub fn new(command: &'a str, args: &'a [Bytes]) -> Arguments<'a> {
        Arguments {
            command,
            parts: args.iter(),
        }
    }

    pub fn command(&self) -> &str {
        self.command
    }

    pub fn remaining(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        self.parts.next().cloned().ok_or_else(|| self.arity())
    }

    pub fn next_string(&mut self) -> Result<String, CommandError> {
        let bytes = self.next_bytes()?;
        str::from_utf8(&bytes)
            .map(|s| s.to_string())
            .map_err(|_| CommandError::InvalidArgument("invalid UTF-8 string".to_string()))
    }

    pub fn next_integer(&mut self) -> Result<i64, CommandError> {
        self.next_parsed("value is not an integer or out of range")
    }

    fn next_parsed<T: str::FromStr>(&mut self, msg: &str) -> Result<T, CommandError> {
        let bytes = self.next_bytes()?;
        str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<T>().ok())
            .ok_or_else(|| CommandError::InvalidArgument(msg.to_string()))
    }

    /// Fails when arguments are left over.
    pub fn finish(self) -> Result<(), CommandError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.arity())
        }
    }

    fn arity(&self) -> CommandError {
        CommandError::WrongArity(self.command.to_lowercase())
    }
}

/// Converts incoming byte-string arguments into a typed handler parameter.
///
/// Scalar types consume exactly one argument. `Option<T>` consumes one if any is left, and `Vec<T>`
/// consumes all of the remaining arguments.
pub trait FromArgs: Sized {
    fn from_args(args: &mut Arguments<'_>) -> Result<Self, CommandError>;
}

impl FromArgs for Bytes {
    fn from_args(args: &mut Arguments<'_>) -> Result<Self, CommandError> {
        args.next_bytes()
    }
}

impl FromArgs for String {
    fn from_args(args: &mut Arguments<'_>) -> Result<Self, CommandError> {
        args.next_string()
    }
}

macro_rules! from_args_parsed {
    ($msg:expr => $($ty:ty),*) => {
        $(
            impl FromArgs for $ty {
                fn from_args(args: &mut Arguments<'_>) -> Result<Self, CommandError> {
                    args.next_parsed($msg)
                }
            }
        )*
    };
}

from_args_parsed!("value is not an integer or out of range" => i64, i32, u64, usize);
from_args_parsed!("value is not a valid float" => f64);

impl<T: FromArgs> FromArgs for Option<T> {
    fn from_args(args: &mut Arguments<'_>) -> Result<Self, CommandError> {
        if args.is_empty() {
            return Ok(None);
        }
        T::from_args(args).map(Some)
    }
}

impl<T: FromArgs> FromArgs for Vec<T> {
    fn from_args(args: &mut Arguments<'_>) -> Result<Self, CommandError> {
        let mut values = Vec::with_capacity(args.remaining());
        while !args.is_empty() {
            values.push(T::from_args(args)?);
        }
        Ok(values)
    }
}

pub mod handler;

use bytes::Bytes;
use itertools::Itertools;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error as ThisError;

use crate::request::Request;
use crate::Error;

pub use handler::{handler_fn, Handler, HandlerFn, IntoReply, Method};
use handler::MethodHandler;

/// Names that belong to the connect and disconnect hooks and can never be commands.
const RESERVED_NAMES: [&str; 2] = ["onconnect", "ondisconnect"];

/// Maps command names to their handlers.
///
/// The table is filled while the server is built and only read afterwards, so sessions look
/// commands up concurrently without any locking. Names are case-insensitive.
#[derive(Default, Clone)]
pub struct CommandTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl CommandTable {
    pub fn new() -> CommandTable {
        CommandTable::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn Handler>) -> Result<(), Error> {
        let key = name.to_lowercase();

        if key.is_empty() || key.chars().any(char::is_whitespace) {
            return Err(Error::InvalidCommandName(name.to_string()));
        }
        if RESERVED_NAMES.contains(&key.as_str()) {
            return Err(Error::ReservedName(name.to_string()));
        }
        if self.handlers.contains_key(&key) {
            return Err(Error::DuplicateRegistration(key));
        }

        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        match self.handlers.get(name) {
            Some(handler) => Some(handler),
            None => self.handlers.get(&name.to_lowercase()),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).sorted().collect()
    }
}

/// A backend object whose methods are exposed as commands.
///
/// The service lists the methods it wants to expose in [`Service::commands`]; the server builds its
/// command table from that list once, when it is constructed.
///
/// ```
/// use respd::{Registry, Request, Service};
/// use bytes::Bytes;
///
/// struct Echo;
///
/// impl Echo {
///     fn echo(&self, _request: &Request, message: Bytes) -> Bytes {
///         message
///     }
/// }
///
/// impl Service for Echo {
///     fn commands(registry: &mut Registry<Self>) {
///         registry.method("echo", Self::echo);
///     }
/// }
/// ```
pub trait Service: Send + Sync + Sized + 'static {
    fn commands(registry: &mut Registry<Self>);

    /// Called once per connection before its first request is read.
    fn on_connect(&self) {}

    /// Called once per connection when its session ends, however it ends.
    fn on_disconnect(&self) {}
}

/// Collects the commands exposed by a [`Service`].
pub struct Registry<S> {
    service: Arc<S>,
    entries: Vec<(String, Arc<dyn Handler>)>,
}

impl<S: Send + Sync + 'static> Registry<S> {
    pub(crate) fn new(service: Arc<S>) -> Registry<S> {
        Registry {
            service,
            entries: Vec::new(),
        }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Exposes a method with typed parameters under `name`.
    pub fn method<M, Args>(&mut self, name: &str, method: M) -> &mut Self
    where
        M: Method<S, Args>,
        Args: 'static,
    {
        let handler = MethodHandler::new(self.service.clone(), method);
        self.entries.push((name.to_string(), Arc::new(handler)));
        self
    }

    /// Exposes a handler that works on the raw request, typically an async [`handler_fn`].
    pub fn handler(&mut self, name: &str, handler: impl Handler) -> &mut Self {
        self.entries.push((name.to_string(), Arc::new(handler)));
        self
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Arc<dyn Handler>)> {
        self.entries
    }
}

/// Why a single command failed. The display form is the exact error line sent to the client.
#[derive(Debug, ThisError)]
pub enum CommandError {
    #[error("ERR unknown command '{command}', with args beginning with: {}", quote_args(.args))]
    UnknownCommand { command: String, args: Vec<Bytes> },
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR {0}")]
    InvalidArgument(String),
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("{0}")]
    Failed(String),
    /// The transport failed while the command ran. The connection is closed without a reply.
    #[error("ERR {0}")]
    Io(#[from] io::Error),
}

impl CommandError {
    /// A generic error reply, `ERR <msg>`.
    pub fn err(msg: impl AsRef<str>) -> CommandError {
        CommandError::Failed(format!("ERR {}", msg.as_ref()))
    }

    pub fn unknown(request: &Request) -> CommandError {
        CommandError::UnknownCommand {
            command: request.name().to_string(),
            args: request.args().to_vec(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::Io(_))
    }
}

fn quote_args(args: &[Bytes]) -> String {
    args.iter()
        .map(|arg| format!("'{}' ", String::from_utf8_lossy(arg)))
        .collect()
}

pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod defaults;
pub mod error;
pub mod monitor;
pub mod reply;
pub mod request;
pub mod server;
pub mod store;
pub mod transport;

pub use commands::{handler_fn, CommandError, Handler, IntoReply, Registry, Service};
pub use config::{Config, Endpoint, Transport};
pub use defaults::DefaultHandler;
pub use error::{Error, Result};
pub use monitor::Monitor;
pub use reply::Reply;
pub use request::{FromArgs, Request};
pub use server::{Server, ServerBuilder};
pub use transport::{Listener, Stream};

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::CodecError;
use crate::commands::{CommandError, CommandTable, Handler, Registry, Service};
use crate::config::Config;
use crate::connection::Connection;
use crate::monitor::{Monitor, Subscription};
use crate::reply::Reply;
use crate::request::SessionInfo;
use crate::transport::Listener;
use crate::Error;

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Hooks {
    on_connect: Vec<Hook>,
    on_disconnect: Vec<Hook>,
}

/// Serves the commands of a [`CommandTable`] to every client that connects.
///
/// The server is cheap to clone; clones share the same command table, hooks and monitor.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    table: CommandTable,
    hooks: Hooks,
    monitor: Monitor,
}

/// Builds a [`Server`]. Registration errors are kept until [`ServerBuilder::build`], which then
/// fails instead of returning a server.
pub struct ServerBuilder {
    config: Config,
    table: CommandTable,
    hooks: Hooks,
    error: Option<Error>,
}

impl ServerBuilder {
    /// Registers a single command.
    pub fn command(self, name: &str, handler: impl Handler) -> Self {
        self.register(name, Arc::new(handler))
    }

    /// Registers every command listed by the service, and its connection hooks.
    pub fn service<S: Service>(mut self, service: S) -> Self {
        let service = Arc::new(service);

        let mut registry = Registry::new(service.clone());
        S::commands(&mut registry);
        for (name, handler) in registry.into_entries() {
            self = self.register(&name, handler);
        }

        let connected = service.clone();
        self.on_connect(move || connected.on_connect())
            .on_disconnect(move || service.on_disconnect())
    }

    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_connect.push(Arc::new(hook));
        self
    }

    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_disconnect.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Server, Error> {
        if let Some(err) = self.error {
            return Err(err);
        }

        debug!(commands = ?self.table.names(), "Command table built");

        Ok(Server {
            inner: Arc::new(Inner {
                config: self.config,
                table: self.table,
                hooks: self.hooks,
                monitor: Monitor::new(),
            }),
        })
    }

    fn register(mut self, name: &str, handler: Arc<dyn Handler>) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.table.register(name, handler) {
                self.error = Some(err);
            }
        }
        self
    }
}

impl Server {
    pub fn builder(config: Config) -> ServerBuilder {
        ServerBuilder {
            config,
            table: CommandTable::new(),
            hooks: Hooks::default(),
            error: None,
        }
    }

    /// Builds a server exposing the commands of a single service.
    pub fn new<S: Service>(config: Config, service: S) -> Result<Server, Error> {
        Server::builder(config).service(service).build()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn commands(&self) -> &CommandTable {
        &self.inner.table
    }

    pub fn monitor(&self) -> &Monitor {
        &self.inner.monitor
    }

    /// Binds the endpoint described by the configuration.
    pub async fn bind(&self) -> Result<Listener, Error> {
        Listener::bind(&self.inner.config.endpoint()).await
    }

    pub async fn listen_and_serve(&self) -> Result<(), Error> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections until accepting fails, running one session task per connection.
    ///
    /// When the configuration caps the number of connections, a slot is claimed before accepting, so
    /// clients over the limit wait in the listen backlog until a session ends.
    pub async fn serve(&self, listener: Listener) -> Result<(), Error> {
        info!("Listening on {}", listener.local_addr()?);

        let limit = connection_limit(self.inner.config.max_connections);

        loop {
            let permit = match &limit {
                Some(limit) => Some(limit.clone().acquire_owned().await.map_err(|_| {
                    Error::Accept(io::Error::other("connection limit is closed"))
                })?),
                None => None,
            };

            let (stream, peer) = listener.accept().await.map_err(|err| {
                error!(error = %err, "Failed to accept connection");
                Error::Accept(err)
            })?;
            info!("Accepted connection from {}", peer);

            let server = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = server.serve_client(stream, peer).await {
                    debug!(error = %err, "Session ended with an error");
                }
            });
        }
    }

    /// Like [`Server::serve`], but returns `Ok(())` once `shutdown` completes. Sessions already
    /// running are not interrupted.
    pub async fn serve_with_shutdown(
        &self,
        listener: Listener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        tokio::select! {
            res = self.serve(listener) => res,
            _ = shutdown => {
                info!("Shutting down, no longer accepting connections");
                Ok(())
            }
        }
    }

    /// Runs one session over `stream` until the peer disconnects or the connection fails.
    ///
    /// The connect hooks run before the first request is read and the disconnect hooks run exactly
    /// once when the session ends, whichever way it ends.
    #[instrument(
        name = "session",
        skip(self, stream),
        fields(session_id = tracing::field::Empty)
    )]
    pub async fn serve_client<T>(&self, stream: T, peer: String) -> Result<(), CodecError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let session = Arc::new(SessionInfo::new(peer, self.inner.monitor.clone()));
        tracing::Span::current().record("session_id", session.id().to_string());

        let guard = SessionGuard::enter(&self.inner.hooks, session.clone());
        let mut connection = Connection::new(stream);

        let result = self.run_session(&mut connection, &session).await;

        // The disconnect hooks run before the transport is released.
        drop(guard);
        // The peer may be gone already.
        let _ = connection.shutdown().await;

        result
    }

    async fn run_session<T>(
        &self,
        connection: &mut Connection<T>,
        session: &Arc<SessionInfo>,
    ) -> Result<(), CodecError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            let mut request = match connection.read_request().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("Connection closed by peer");
                    return Ok(());
                }
                Err(err) => return Err(reject(connection, err).await),
            };

            request.attach(session);
            debug!(command = request.name(), args = request.args().len(), "Received request");
            self.inner.monitor.publish(&request);

            let result = match self.inner.table.lookup(request.name()) {
                Some(handler) => handler.call(request).await,
                None => Err(CommandError::unknown(&request)),
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(CommandError::Io(err)) => {
                    error!(error = %err, "Command failed on the transport");
                    return Err(CodecError::Io(err));
                }
                Err(err) => Reply::Error(err.to_string()),
            };

            debug!(%reply, "Sending reply");
            connection.write_reply(reply).await?;

            if let Some(subscription) = session.take_monitor() {
                return stream_monitor(connection, subscription).await;
            }
        }
    }
}

/// Writes every monitored command to the client until it disconnects. Requests sent meanwhile are
/// read only to notice the disconnect.
async fn stream_monitor<T>(
    connection: &mut Connection<T>,
    mut subscription: Subscription,
) -> Result<(), CodecError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    debug!("Connection switched to monitor mode");

    loop {
        tokio::select! {
            line = subscription.recv() => match line {
                Some(line) => connection.write_reply(Reply::Status(line)).await?,
                None => return Ok(()),
            },
            request = connection.read_request() => match request {
                Ok(Some(request)) => debug!(command = request.name(), "Ignoring request while monitoring"),
                Ok(None) => return Ok(()),
                Err(err) => return Err(reject(connection, err).await),
            },
        }
    }
}

/// Sends the reason a request could not be read, before the session closes.
async fn reject<T>(connection: &mut Connection<T>, err: CodecError) -> CodecError
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    warn!(error = %err, "Closing connection");
    // Best effort, the write fails silently when the peer is gone.
    let _ = connection
        .write_reply(Reply::Error(format!("ERR {}", err)))
        .await;
    err
}

/// Permits for the connection cap, `None` when unlimited. Caps above what a semaphore can hold
/// are lowered to that maximum.
fn connection_limit(max: usize) -> Option<Arc<Semaphore>> {
    match max {
        0 => None,
        max => Some(Arc::new(Semaphore::new(max.min(Semaphore::MAX_PERMITS)))),
    }
}

/// Runs the connect hooks when created and the disconnect hooks when dropped, so the disconnect
/// hooks also run when the session task panics or is cancelled.
struct SessionGuard<'a> {
    hooks: &'a Hooks,
    session: Arc<SessionInfo>,
}

impl<'a> SessionGuard<'a> {
    fn enter(hooks: &'a Hooks, session: Arc<SessionInfo>) -> SessionGuard<'a> {
        debug!("Session started");
        for hook in &hooks.on_connect {
            hook();
        }
        SessionGuard { hooks, session }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.session.close();
        for hook in &self.hooks.on_disconnect {
            hook();
        }
        debug!("Session closed");
    }
}

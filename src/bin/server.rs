use clap::Parser;
use respd::config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SOCKET_PATH};
use respd::{Config, DefaultHandler, Error, Server, Transport};
use std::path::PathBuf;
use tracing::{debug, info, Level};

#[derive(Parser, Debug)]
#[command(version, about = "A RESP server over an in-memory keyspace")]
struct Args {
    /// The kind of socket to listen on, `tcp` or `unix`
    #[arg(short, long, env = "RESPD_TRANSPORT", default_value_t = Transport::Tcp)]
    transport: Transport,

    /// The host to listen on, empty for every interface
    #[arg(long, env = "RESPD_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// The port to listen on
    #[arg(short, long, env = "RESPD_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// The Unix socket path to listen on
    #[arg(short, long, env = "RESPD_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// The maximum number of clients served at once, 0 or less for no limit
    #[arg(
        short,
        long,
        env = "RESPD_MAX_CONNECTIONS",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    max_connections: i64,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let _ = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let config = Config::default()
        .transport(args.transport)
        .host(args.host)
        .port(args.port)
        .socket_path(args.socket)
        .max_connections_from(args.max_connections);

    let server = Server::new(config, DefaultHandler::new())?;
    let listener = server.bind().await?;

    server
        .serve_with_shutdown(listener, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                debug!("Failed to listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

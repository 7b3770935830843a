use std::fmt;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6389;
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/redis.sock";

/// The kind of socket the server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Transport {
    #[default]
    Tcp,
    Unix,
}

/// Where the server listens and how many clients it serves at once.
///
/// ```
/// use respd::{Config, Endpoint, Transport};
///
/// let config = Config::default().port(7000).max_connections(64);
/// assert_eq!(config.endpoint(), Endpoint::Tcp("127.0.0.1:7000".to_string()));
///
/// let config = Config::default().transport(Transport::Unix);
/// assert_eq!(config.endpoint(), Endpoint::Unix("/tmp/redis.sock".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub transport: Transport,
    /// An empty host listens on every interface.
    pub host: String,
    pub port: u16,
    pub socket_path: PathBuf,
    /// Upper bound of simultaneously served connections, `0` means unlimited.
    pub max_connections: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transport: Transport::Tcp,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_connections: 0,
        }
    }
}

impl Config {
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Same as [`Config::max_connections`], with zero or negative values meaning unlimited.
    pub fn max_connections_from(self, max: i64) -> Self {
        self.max_connections(usize::try_from(max).unwrap_or(0))
    }

    pub fn endpoint(&self) -> Endpoint {
        match self.transport {
            Transport::Tcp => {
                let host = if self.host.is_empty() {
                    "0.0.0.0"
                } else {
                    self.host.as_str()
                };
                Endpoint::Tcp(format!("{}:{}", host, self.port))
            }
            Transport::Unix => Endpoint::Unix(self.socket_path.clone()),
        }
    }
}

/// A resolved address to listen on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Unix(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

use itertools::Itertools;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::request::Request;

/// The capacity of the broadcast channel shared by all monitoring clients.
const CHANNEL_CAPACITY: usize = 1024;

/// Broadcasts every command processed by the server to the clients that issued `MONITOR`.
///
/// The monitor is owned by the server and cloned cheaply into every session. Subscribing returns a
/// [`Subscription`]; dropping it unsubscribes.
#[derive(Clone, Debug)]
pub struct Monitor {
    sender: broadcast::Sender<String>,
}

impl Monitor {
    pub fn new() -> Monitor {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Monitor { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes a request to the current subscribers. Formatting is skipped when nobody listens.
    pub fn publish(&self, request: &Request) {
        if self.subscribers() == 0 {
            return;
        }
        // Sending only fails when the last subscriber went away in the meantime.
        let _ = self.sender.send(format_line(request, SystemTime::now()));
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

/// A live `MONITOR` feed.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    /// Waits for the next line. Returns `None` once the monitor is gone.
    ///
    /// A subscriber that falls behind skips the lines it missed.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(line) => return Some(line),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Monitor subscriber lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// 1339518083.107412 [0 127.0.0.1:60866] "keys" "*"
fn format_line(request: &Request, now: SystemTime) -> String {
    let elapsed = now.duration_since(UNIX_EPOCH).unwrap_or_default();

    format!(
        "{}.{:06} [0 {}] {}",
        elapsed.as_secs(),
        elapsed.subsec_micros(),
        request.peer(),
        std::iter::once(request.name().as_bytes())
            .chain(request.args().iter().map(|arg| &arg[..]))
            .map(quote)
            .format(" ")
    )
}

fn quote(arg: &[u8]) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for &byte in arg {
        match byte {
            b'"' => quoted.push_str("\\\""),
            b'\\' => quoted.push_str("\\\\"),
            b'\n' => quoted.push_str("\\n"),
            b'\r' => quoted.push_str("\\r"),
            b'\t' => quoted.push_str("\\t"),
            0x20..=0x7e => quoted.push(byte as char),
            _ => quoted.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    quoted.push('"');
    quoted
}

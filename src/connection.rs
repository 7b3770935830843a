use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

use crate::codec::{CodecError, RespCodec};
use crate::reply::Reply;
use crate::request::Request;

/// Initial capacity of the read buffer.
const READ_BUFFER_CAPACITY: usize = 4096;

/// A client connection: requests are decoded off the transport, replies are encoded onto it.
pub struct Connection<T> {
    // Data is read from the transport into the read buffer of the framed stream. When a request is
    // decoded, the corresponding data is removed from the buffer.
    framed: Framed<T, RespCodec>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: T) -> Connection<T> {
        Connection {
            framed: Framed::with_capacity(stream, RespCodec::new(), READ_BUFFER_CAPACITY),
        }
    }

    /// Reads the next request. `Ok(None)` means the peer closed the connection cleanly, between two
    /// requests.
    pub async fn read_request(&mut self) -> Result<Option<Request>, CodecError> {
        self.framed.next().await.transpose()
    }

    /// Writes a reply and flushes it to the transport.
    pub async fn write_reply(&mut self, reply: Reply) -> Result<(), CodecError> {
        self.framed.send(reply).await
    }

    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }
}

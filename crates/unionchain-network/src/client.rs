use crate::codec::{read_frame, write_frame};
use crate::message::{Message, MASK_BIT};
use crate::settings::{IS_CLIENT, TIME_LIMIT};
use crate::{NetworkError, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Transient request/response connection. Announces itself with the client
/// role byte, so the remote serves it without adding it to the gossip set.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self> {
        let mut stream = timeout(TIME_LIMIT, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Timeout)??;
        stream.write_all(&[IS_CLIENT]).await?;
        Ok(Self { stream })
    }

    /// Send one request and wait up to [`TIME_LIMIT`] for its response; the
    /// response head must be the request head with the response bit set.
    pub async fn request(&mut self, msg: &Message) -> Result<Message> {
        write_frame(&mut self.stream, msg).await?;

        let (resp, _) = timeout(TIME_LIMIT, read_frame(&mut self.stream))
            .await
            .map_err(|_| NetworkError::Timeout)??;

        let expected = msg.head() | MASK_BIT;
        if resp.head() != expected {
            return Err(NetworkError::BadResponse {
                expected,
                got: resp.head(),
            });
        }
        Ok(resp)
    }
}

use crate::message::{frame_hash, Message, NETWORK_TAG};
use crate::settings::{PACK_SIZE, TIME_LIMIT};
use crate::{NetworkError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use unionchain_crypto::Hash;

/// Read one length-prefixed JSON frame. The wait for the length prefix is
/// unbounded (gossip connections idle between frames); once a frame has
/// started, the remainder must arrive within [`TIME_LIMIT`]. Returns the
/// parsed message and the dedup hash of the received frame bytes.
pub async fn read_frame<R>(reader: &mut R) -> Result<(Message, Hash)>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf).await?;

    let len = u64::from_be_bytes(len_buf);
    if len > PACK_SIZE {
        return Err(NetworkError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    timeout(TIME_LIMIT, reader.read_exact(&mut payload))
        .await
        .map_err(|_| NetworkError::Timeout)??;

    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&len_buf);
    frame.extend_from_slice(&payload);
    let hash = frame_hash(&frame);

    let msg: Message =
        serde_json::from_slice(&payload).map_err(|e| NetworkError::BadFrame(e.to_string()))?;

    if msg.network() != NETWORK_TAG {
        return Err(NetworkError::WrongNetwork(msg.network().to_string()));
    }

    Ok((msg, hash))
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.to_frame()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MSG_GET_TIME;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let msg = Message::new(MSG_GET_TIME, b"body".to_vec());

        write_frame(&mut client, &msg).await.unwrap();
        let (read, hash) = read_frame(&mut server).await.unwrap();
        assert_eq!(read, msg);
        assert_eq!(hash, frame_hash(&msg.to_frame()));
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bogus_len = (PACK_SIZE + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client, &bogus_len)
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, NetworkError::FrameTooLarge(_)));
        assert!(err.closes_connection());
    }

    #[tokio::test]
    async fn test_malformed_json_is_retryable() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let payload = b"not json";
        let mut frame = (payload.len() as u64).to_be_bytes().to_vec();
        frame.extend_from_slice(payload);
        tokio::io::AsyncWriteExt::write_all(&mut client, &frame)
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, NetworkError::BadFrame(_)));
        assert!(!err.closes_connection());
    }

    #[tokio::test]
    async fn test_wrong_network_tag_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let msg = Message::new(MSG_GET_TIME, vec![]);
        let json = serde_json::to_string(&msg)
            .unwrap()
            .replace(NETWORK_TAG, "other-network");
        let mut frame = (json.len() as u64).to_be_bytes().to_vec();
        frame.extend_from_slice(json.as_bytes());
        tokio::io::AsyncWriteExt::write_all(&mut client, &frame)
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, NetworkError::WrongNetwork(_)));
    }
}

// SPDX-License-Identifier: MIT

//! Length-prefixed message framing shared by the local and remote command
//! endpoints (spec.md §4.H, §4.I): a 4-byte big-endian length prefix
//! followed by a JSON payload.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A message larger than this is almost certainly a protocol desync
/// (mismatched framing, a client talking to the wrong port) rather than a
/// legitimate oversized request; reject it instead of allocating
/// unboundedly.
const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("message of {0} bytes exceeds the {1} byte limit")]
    TooLarge(u32, u32),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Serializes `value` to JSON without any length prefix.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Writes `payload` prefixed with its big-endian `u32` length.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed message, rejecting lengths above
/// [`MAX_MESSAGE_BYTES`].
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::TooLarge(len, MAX_MESSAGE_BYTES));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Reads one framed message and JSON-decodes it as `T`.
pub async fn read_request<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let bytes = read_message(reader).await?;
    decode(&bytes)
}

/// JSON-encodes `value` and writes it as one framed message.
pub async fn write_response<W, T>(writer: &mut W, value: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(value)?;
    write_message(writer, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_returns_json_without_length_prefix() {
        let encoded = encode(&"hello").expect("encode");
        assert_eq!(encoded, br#""hello""#);
    }

    #[tokio::test]
    async fn read_write_message_roundtrip() {
        let original = b"hello world";
        let mut buffer = Vec::new();
        write_message(&mut buffer, original).await.expect("write");
        assert_eq!(buffer.len(), 4 + original.len());

        let mut cursor = std::io::Cursor::new(buffer);
        let read_back = read_message(&mut cursor).await.expect("read");
        assert_eq!(read_back, original);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_before_allocating() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_MESSAGE_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buffer);
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge(_, _)));
    }

    #[tokio::test]
    async fn read_request_write_response_roundtrip_typed_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Ping {
            n: u32,
        }
        let mut buffer = Vec::new();
        write_response(&mut buffer, &Ping { n: 7 }).await.expect("write");
        let mut cursor = std::io::Cursor::new(buffer);
        let decoded: Ping = read_request(&mut cursor).await.expect("read");
        assert_eq!(decoded, Ping { n: 7 });
    }
}

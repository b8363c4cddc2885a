//! Store wire protocol: length-prefixed JSON over TCP.
//!
//! Every message is `[u32 payload_len LE][JSON payload]`. Requests carry a
//! `cmd` field; replies are `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": "..."}`.

use serde::Deserialize;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use formsearch_core::{Error, Result};

/// Maximum single message payload (64 MB safety limit).
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("payload too large: {} bytes", payload.len())))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = u32::from_le_bytes(header);
    if len > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("payload too large: {} bytes", len)));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Decode a reply frame into its `data`, or the store's error message.
pub fn decode_reply(frame: &[u8]) -> Result<Value> {
    let reply: Reply = serde_json::from_slice(frame)?;
    if reply.ok {
        Ok(reply.data)
    } else {
        let msg = reply.error.filter(|m| !m.is_empty()).unwrap_or_else(|| "unknown error".to_string());
        Err(Error::Store(msg))
    }
}

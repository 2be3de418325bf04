use std::io;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[u8] = b"\r\n";

/// Longest frame accepted from a peer, line ending included.
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Store,
    Load,
    Erase,
    /// Any kind this server doesn't recognise. Decodes successfully so the
    /// client gets a failure response instead of a decode error.
    #[serde(other)]
    Unknown,
}

impl RequestKind {
    pub fn is_mutation(self) -> bool {
        matches!(self, RequestKind::Store | RequestKind::Erase)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreRequest {
    pub request_type: RequestKind,
    pub key: String,
    /// Value to store. Only meaningful for STORE.
    #[serde(default)]
    pub data: Vec<u8>,
}

impl StoreRequest {
    pub fn store(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            request_type: RequestKind::Store,
            key: key.into(),
            data: data.into(),
        }
    }

    pub fn load(key: impl Into<String>) -> Self {
        Self {
            request_type: RequestKind::Load,
            key: key.into(),
            data: Vec::new(),
        }
    }

    pub fn erase(key: impl Into<String>) -> Self {
        Self {
            request_type: RequestKind::Erase,
            key: key.into(),
            data: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreResponse {
    /// Key of the request this answers. Empty if the request couldn't be decoded.
    pub key: String,
    pub success: bool,
    /// Value for a successful LOAD, empty otherwise.
    #[serde(default)]
    pub data: Vec<u8>,
}

impl StoreResponse {
    pub fn failure(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: false,
            data: Vec::new(),
        }
    }
}

pub fn encode<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(frame)
}

/// Reads one newline-delimited frame, without its line ending.
///
/// Blank lines are skipped. Returns `Ok(None)` once the peer closes the
/// stream, and an `InvalidData` error for a line longer than
/// [`MAX_FRAME_LEN`].
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    read_frame_within(reader, MAX_FRAME_LEN).await
}

async fn read_frame_within<R>(reader: &mut R, limit: u64) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }
        if bytes as u64 == limit && line.last() != Some(&b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame exceeds {limit} bytes"),
            ));
        }

        while line.last().is_some_and(|byte| LINE_ENDINGS.contains(byte)) {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }

        return Ok(Some(line));
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(frame) => decode(&frame).map(Some).map_err(to_io_error),
        None => Ok(None),
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = encode(message).map_err(to_io_error)?;
    write_frame(writer, &encoded).await
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use tokio::{
    io::BufReader,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tracing::debug;

use crate::protocol::{StoreRequest, StoreResponse, read_message, write_message};

/// Connection to a running store. Requests are answered one at a time, in
/// the order they were sent.
pub struct StoreClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl StoreClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        debug!("connected to {}", addr);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    pub async fn store(&mut self, key: &str, data: impl Into<Vec<u8>>) -> Result<StoreResponse> {
        self.request(&StoreRequest::store(key, data)).await
    }

    pub async fn load(&mut self, key: &str) -> Result<StoreResponse> {
        self.request(&StoreRequest::load(key)).await
    }

    pub async fn erase(&mut self, key: &str) -> Result<StoreResponse> {
        self.request(&StoreRequest::erase(key)).await
    }

    pub async fn request(&mut self, request: &StoreRequest) -> Result<StoreResponse> {
        write_message(&mut self.writer, request)
            .await
            .context("failed to send request")?;

        match read_message::<_, StoreResponse>(&mut self.reader)
            .await
            .context("failed to read response")?
        {
            Some(response) => Ok(response),
            None => bail!("server closed the connection"),
        }
    }
}

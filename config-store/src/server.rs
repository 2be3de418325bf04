use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info, warn};

use crate::protocol::{read_frame, write_frame};
use crate::service::Envelope;

/// TCP front end that forwards request frames to a [`StoreService`].
///
/// Connections are served by their own tasks, but those tasks only relay
/// bytes; every frame is applied by the single reactor behind `requests`.
///
/// [`StoreService`]: crate::service::StoreService
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Binds the listening socket. Without it the store has nothing to
    /// serve, so callers treat an error here as fatal.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self::new(listener))
    }

    pub fn new(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, requests: mpsc::Sender<Envelope>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &requests);
                }
            }
        }

        Ok(())
    }

    /// Serves until the process is asked to stop with ctrl-c or SIGTERM.
    pub async fn run_until_shutdown_signal(
        self,
        requests: mpsc::Sender<Envelope>,
    ) -> Result<()> {
        self.run_until(requests, shutdown_signal()).await
    }
}

/// Resolves on the first ctrl-c or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = ?err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = ?err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    requests: &mpsc::Sender<Envelope>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, requests),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, requests: &mpsc::Sender<Envelope>) {
    let requests = requests.clone();
    tokio::spawn(async move {
        debug!(%peer, "client connected");
        match handle_connection(stream, requests).await {
            Ok(()) => debug!(%peer, "client disconnected"),
            Err(err) => warn!(%peer, error = ?err, "client connection closed with error"),
        }
    });
}

async fn handle_connection(stream: TcpStream, requests: mpsc::Sender<Envelope>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(frame) = read_frame(&mut reader).await? {
        let (respond_to, response_rx) = oneshot::channel();
        requests
            .send(Envelope { frame, respond_to })
            .await
            .context("store service has stopped")?;

        match response_rx.await {
            Ok(response) => write_frame(&mut writer, &response).await?,
            Err(_) => warn!("no response for request, dropping it"),
        }
    }

    Ok(())
}

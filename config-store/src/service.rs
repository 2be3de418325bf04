//! The reactor that owns all store state.
//!
//! [`StoreService`] holds the [`Store`], the [`PersistenceManager`] and the
//! [`DebounceScheduler`]. Its event loop waits on exactly three sources:
//!
//! - **Requests**: raw frames arriving on an mpsc channel, each with a
//!   oneshot for the reply. Transports (see [`crate::server`]) only hold the
//!   sending half, so the state itself is never shared.
//! - **Save timer**: the scheduler's deadline, if one is armed.
//! - **Shutdown**: any future the caller provides.
//!
//! Each event is handled to completion before the next one is polled, so
//! requests are applied strictly in the order they were queued. Dropping the
//! service performs one last synchronous save.

use std::future::Future;

use anyhow::{Context, Result, anyhow};
use tokio::{
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::persistence::{DiskWrites, PersistenceManager, SaveError};
use crate::processor::RequestProcessor;
use crate::protocol::{self, StoreRequest, StoreResponse};
use crate::scheduler::{DebounceScheduler, TimerOutcome};
use crate::store::Store;

/// Requests queued ahead of the reactor before senders start waiting.
const REQUEST_QUEUE_DEPTH: usize = 128;

/// One raw request frame and where to send the encoded response.
#[derive(Debug)]
pub struct Envelope {
    pub frame: Vec<u8>,
    pub respond_to: oneshot::Sender<Vec<u8>>,
}

pub fn request_channel() -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
    mpsc::channel(REQUEST_QUEUE_DEPTH)
}

#[derive(Debug)]
pub struct StoreService {
    store: Store,
    persistence: PersistenceManager,
    scheduler: DebounceScheduler,
}

impl StoreService {
    /// Builds the service and loads the persisted snapshot.
    ///
    /// A snapshot that is missing or can't be decoded is logged and the
    /// service starts empty; the next save overwrites it.
    pub fn open(config: &StoreConfig) -> Self {
        let persistence = PersistenceManager::new(&config.storage_path);
        let scheduler = DebounceScheduler::new(config.save_backoff);

        let mut store = Store::new();
        match persistence.load() {
            Ok(snapshot) => {
                info!(
                    path = %persistence.path().display(),
                    entries = snapshot.len(),
                    "loaded snapshot"
                );
                store.replace_all(snapshot);
            }
            Err(err) => {
                error!(error = ?err, "failed to load snapshot, starting with an empty store");
            }
        }

        if scheduler.is_synchronous() {
            info!("saving synchronously on every mutation");
        } else if let Some(backoff) = scheduler.backoff() {
            info!(
                initial_ms = backoff.initial().as_millis() as u64,
                max_ms = backoff.max().as_millis() as u64,
                "debouncing saves"
            );
        }

        Self {
            store,
            persistence,
            scheduler,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn disk_writes(&self) -> DiskWrites {
        self.persistence.disk_writes()
    }

    pub fn is_save_pending(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Handles one request frame. See [`RequestProcessor::process_frame`].
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        RequestProcessor::new(&mut self.store, &mut self.scheduler, &self.persistence)
            .process_frame(frame)
    }

    /// Attempts the pending save. Called by the event loop once the save
    /// deadline passes.
    pub fn on_save_timer(&mut self) -> TimerOutcome {
        let store = &self.store;
        let persistence = &self.persistence;
        let outcome = self
            .scheduler
            .on_timer_expired(|| persistence.save(store.snapshot()));
        debug!(?outcome, "save timer fired");
        outcome
    }

    /// Saves the current content immediately, outside of any schedule.
    pub fn save_now(&self) -> Result<(), SaveError> {
        self.persistence.save(self.store.snapshot())
    }

    /// Runs the event loop until `shutdown` resolves.
    ///
    /// If every request sender is dropped the loop keeps serving the save
    /// timer and still waits for `shutdown`.
    pub async fn run_until<F>(&mut self, mut requests: mpsc::Receiver<Envelope>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut accepting = true;

        loop {
            let deadline = self.scheduler.deadline();
            select! {
                _ = &mut shutdown => {
                    info!("store shutting down");
                    break;
                }
                envelope = requests.recv(), if accepting => match envelope {
                    Some(envelope) => self.handle_envelope(envelope),
                    None => {
                        debug!("all request senders dropped");
                        accepting = false;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_save_timer();
                }
            }
        }
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        let Envelope { frame, respond_to } = envelope;
        match self.process_frame(&frame) {
            Some(response) => {
                if respond_to.send(response).is_err() {
                    debug!("requester went away before the response was ready");
                }
            }
            // Dropping `respond_to` tells the transport there is no response.
            None => warn!("dropping request without a response"),
        }
    }
}

impl Drop for StoreService {
    fn drop(&mut self) {
        match self.save_now() {
            Ok(()) => info!(
                path = %self.persistence.path().display(),
                entries = self.store.len(),
                "final snapshot saved"
            ),
            Err(err) => error!(error = ?err, "final snapshot save failed"),
        }
    }
}

/// A [`StoreService`] running on its own task.
pub struct ServiceHandle {
    requests: mpsc::Sender<Envelope>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    disk_writes: DiskWrites,
}

impl ServiceHandle {
    pub fn spawn(service: StoreService) -> Self {
        let (requests, request_rx) = request_channel();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let disk_writes = service.disk_writes();

        let task = tokio::spawn(async move {
            let mut service = service;
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            service.run_until(request_rx, shutdown).await;
        });

        Self {
            requests,
            shutdown,
            task,
            disk_writes,
        }
    }

    /// Sender for transports to queue request frames on.
    pub fn requests(&self) -> mpsc::Sender<Envelope> {
        self.requests.clone()
    }

    pub fn disk_writes(&self) -> DiskWrites {
        self.disk_writes.clone()
    }

    /// Sends a request straight to the reactor, bypassing any transport.
    pub async fn request(&self, request: &StoreRequest) -> Result<StoreResponse> {
        let frame = protocol::encode(request).context("failed to encode request")?;
        let (respond_to, response_rx) = oneshot::channel();
        self.requests
            .send(Envelope { frame, respond_to })
            .await
            .map_err(|_| anyhow!("store service has stopped"))?;
        let response = response_rx.await.context("store service dropped the request")?;
        protocol::decode(&response).context("failed to decode response")
    }

    /// Stops the reactor and waits until it has exited and written its final
    /// snapshot.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task.await.context("store service task failed")
    }
}

//! Request handling: decode, apply, decide on persistence, encode.
//!
//! A request moves through `Decoding -> Dispatching -> Persisting ->
//! Responding` inside a single call to [`RequestProcessor::process_frame`].
//! Nothing survives between requests except what lives in the [`Store`] and
//! the [`DebounceScheduler`].

use tracing::{debug, error, warn};

use crate::persistence::PersistenceManager;
use crate::protocol::{self, RequestKind, StoreRequest, StoreResponse};
use crate::scheduler::DebounceScheduler;
use crate::store::Store;

/// Applies requests to state it borrows from the service.
pub struct RequestProcessor<'a> {
    store: &'a mut Store,
    scheduler: &'a mut DebounceScheduler,
    persistence: &'a PersistenceManager,
}

impl<'a> RequestProcessor<'a> {
    pub fn new(
        store: &'a mut Store,
        scheduler: &'a mut DebounceScheduler,
        persistence: &'a PersistenceManager,
    ) -> Self {
        Self {
            store,
            scheduler,
            persistence,
        }
    }

    /// Handles one raw request frame and returns the encoded response.
    ///
    /// A frame that doesn't decode gets a failure response. `None` means the
    /// response itself couldn't be encoded and should be dropped.
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let response = match protocol::decode::<StoreRequest>(frame) {
            Ok(request) => self.handle(request),
            Err(err) => {
                warn!(error = ?err, bytes = frame.len(), "failed to decode request");
                StoreResponse::failure(String::new())
            }
        };

        match protocol::encode(&response) {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                error!(error = ?err, key = %response.key, "failed to encode response");
                None
            }
        }
    }

    /// Applies a decoded request and, for a successful mutation, asks the
    /// scheduler for a save.
    pub fn handle(&mut self, request: StoreRequest) -> StoreResponse {
        let StoreRequest {
            request_type,
            key,
            data,
        } = request;

        let mut response = StoreResponse::failure(key.clone());
        match request_type {
            RequestKind::Store => {
                self.store.put(key, data);
                response.success = true;
            }
            RequestKind::Load => {
                if let Some(value) = self.store.get(&key) {
                    response.success = true;
                    response.data = value.to_vec();
                }
            }
            RequestKind::Erase => {
                response.success = self.store.erase(&key);
            }
            RequestKind::Unknown => {
                error!(key = %key, "got unknown request");
            }
        }

        if response.success && request_type.is_mutation() {
            self.schedule_save(&response.key);
        }

        response
    }

    fn schedule_save(&mut self, key: &str) {
        let store = &*self.store;
        let persistence = self.persistence;
        let decision = self
            .scheduler
            .on_mutation(|| persistence.save(store.snapshot()));
        debug!(key, ?decision, "mutation applied");
    }
}

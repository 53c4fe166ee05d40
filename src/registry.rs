//! Correlation registry mapping outbound requests to pending completions.
//!
//! Registration happens strictly before transmission so a response racing
//! the write can never be missed. Resolution is structural: completing an
//! entry removes it from the table and consumes its one-shot sender, so
//! exactly one of resolve, cancel or broadcast ever takes effect per entry
//! and the winner is whoever removes the key first.
//!
//! `register` and `cancel` may be called concurrently from arbitrary caller
//! tasks; `resolve` and `broadcast_failure` arrive from the connection's
//! inbound task. The sharded map absorbs the contention.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{identity::IdentityError, proto::ProtoObject, transport::TransportError};

/// Failure observed by a caller awaiting a request.
///
/// Clonable so a single connection-level failure can be broadcast to every
/// pending entry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// The connection failed; every request pending at that moment receives
    /// this same error.
    #[error("connection failure: {0}")]
    Connection(Arc<TransportError>),
    /// The handshake aborted before the session became active.
    #[error("handshake failed: {0}")]
    Handshake(#[source] IdentityError),
    /// The server answered with an error envelope.
    #[error("server returned error {code}: {message}")]
    Rpc {
        /// Numeric error code from the envelope.
        code: i32,
        /// Human-readable error text from the envelope.
        message: String,
    },
    /// The request could not be serialized for transmission.
    #[error("failed to encode request: {0}")]
    Encode(String),
    /// The caller's cancellation token fired before a response arrived.
    #[error("request cancelled")]
    Cancelled,
    /// The response resolved but did not match the expected result type.
    #[error("reply did not match the expected result type")]
    UnexpectedReply,
    /// The registry was dropped with the entry still pending.
    #[error("request abandoned before completion")]
    Abandoned,
}

/// Outcome a pending entry resolves with.
pub type RequestOutcome = Result<ProtoObject, RequestError>;

/// Completion handle returned by [`RequestRegistry::register`].
#[derive(Debug)]
pub struct Completion(oneshot::Receiver<RequestOutcome>);

impl Completion {
    /// Wait for the entry to resolve.
    pub async fn wait(self) -> RequestOutcome {
        match self.0.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RequestError::Abandoned),
        }
    }
}

struct PendingEntry {
    request: ProtoObject,
    tx: oneshot::Sender<RequestOutcome>,
    /// Set when a writer claims the entry for transmission via
    /// [`RequestRegistry::claim_for_send`]; the registry itself never
    /// infers "sent" status.
    sent: bool,
}

/// Table of requests awaiting resolution, keyed by correlation identifier.
pub struct RequestRegistry {
    next_id: AtomicU64,
    pending: DashMap<u64, PendingEntry>,
}

impl Default for RequestRegistry {
    fn default() -> Self { Self::new() }
}

impl RequestRegistry {
    /// Create an empty registry. One registry serves one connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate a correlation identifier and store a pending entry for
    /// `request`.
    ///
    /// Never blocks and never touches the transport. Identifiers are
    /// allocated in registration order, which is the order
    /// [`pending_unsent`](Self::pending_unsent) later reports.
    pub fn register(&self, request: ProtoObject) -> (u64, Completion) {
        // Relaxed suffices: only uniqueness is required of the counter.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingEntry {
                request,
                tx,
                sent: false,
            },
        );
        debug!(correlation_id = id, "registered pending request");
        (id, Completion(rx))
    }

    /// Complete the entry for `id` with `outcome` and remove it.
    ///
    /// An unknown identifier (a late or duplicate response, or an entry
    /// already resolved by cancellation) is a logged correlation miss,
    /// never a failure. Returns whether an entry was resolved.
    pub fn resolve(&self, id: u64, outcome: RequestOutcome) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                // The caller may have stopped awaiting; a dead receiver is
                // not an error.
                let _ = entry.tx.send(outcome);
                true
            }
            None => {
                warn!(correlation_id = id, "correlation miss: no pending entry");
                false
            }
        }
    }

    /// Complete the entry for `id` with a cancellation outcome.
    ///
    /// Races against [`resolve`](Self::resolve) settle first-writer-wins;
    /// the loser finds no entry and no-ops. Returns whether this call won.
    pub fn cancel(&self, id: u64) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                debug!(correlation_id = id, "request cancelled");
                let _ = entry.tx.send(Err(RequestError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Complete every currently pending entry with `error`.
    ///
    /// The pending set is snapshotted first, then each entry is removed and
    /// completed individually. Entries registered after the snapshot belong
    /// to a retry on a fresh connection and are unaffected.
    pub fn broadcast_failure(&self, error: &RequestError) {
        let snapshot: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        if snapshot.is_empty() {
            return;
        }
        warn!(
            count = snapshot.len(),
            %error,
            "broadcasting failure to pending requests"
        );
        for id in snapshot {
            if let Some((_, entry)) = self.pending.remove(&id) {
                let _ = entry.tx.send(Err(error.clone()));
            }
        }
    }

    /// Entries still awaiting first transmission, in registration order.
    ///
    /// Entries are not removed; removal happens only on resolution. This is
    /// a snapshot: before writing any entry it reports, the gateway must
    /// still win [`claim_for_send`](Self::claim_for_send), because a
    /// concurrent sender or a cancellation may beat the flush to it.
    #[must_use]
    pub fn pending_unsent(&self) -> Vec<(u64, ProtoObject)> {
        let mut unsent: Vec<(u64, ProtoObject)> = self
            .pending
            .iter()
            .filter(|entry| !entry.value().sent)
            .map(|entry| (*entry.key(), entry.value().request.clone()))
            .collect();
        unsent.sort_unstable_by_key(|(id, _)| *id);
        unsent
    }

    /// Atomically claim the entry for `id` for transmission.
    ///
    /// Returns `true` exactly once per entry: for the first claimant while
    /// the entry is still pending. A `false` return means another writer
    /// already claimed it, or the entry resolved (for example by
    /// cancellation) in the meantime; the caller must not write the
    /// request. This is what keeps the caller's own send and the
    /// post-handshake flush from transmitting the same request twice.
    pub fn claim_for_send(&self, id: u64) -> bool {
        match self.pending.get_mut(&id) {
            Some(mut entry) if !entry.sent => {
                entry.sent = true;
                true
            }
            _ => false,
        }
    }

    /// Number of entries currently pending.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.pending.len() }
}

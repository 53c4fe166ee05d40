//! Session gateway: handshake state machine and outbound traffic gate.
//!
//! The gateway receives fully decoded protocol objects and connection
//! lifecycle events, owns the [`SessionState`] machine, and is the single
//! point from which requests are written to the transport. Requests issued
//! before the session is active stay queued in the
//! [`RequestRegistry`] and are replayed, in registration order, exactly
//! once after activation.

use std::{
    pin::pin,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    identity::{ClientIdentity, ClientSession},
    proto::{Envelope, ProtoObject, RemoteCall, SCHEMA_LAYER, SessionConfig},
    registry::{RequestError, RequestRegistry},
    serializer::Serializer,
    transport::{Transport, TransportError},
};

/// Lifecycle of one connection's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection-active signal observed yet.
    Uninitialized,
    /// Negotiation is in progress; only the handshake request may be
    /// written.
    Handshaking,
    /// Configuration negotiated; ordinary traffic flows.
    Active,
    /// The transport failed; no further writes will succeed.
    Failed,
}

/// Per-connection gateway over a serializer and a transport.
///
/// Constructed once per connection; there are no process-wide singletons,
/// so multiple concurrent connections and deterministic tests each get
/// their own gateway and registry.
pub struct SessionGateway<S, T> {
    serializer: Arc<S>,
    transport: T,
    registry: RequestRegistry,
    identity: ClientIdentity,
    session: ClientSession,
    state: Mutex<SessionState>,
    config: Mutex<Option<SessionConfig>>,
}

impl<S: Serializer, T: Transport> SessionGateway<S, T> {
    /// Create a gateway for a freshly connected channel.
    #[must_use]
    pub fn new(
        serializer: Arc<S>,
        transport: T,
        identity: ClientIdentity,
        session: ClientSession,
    ) -> Self {
        Self {
            serializer,
            transport,
            registry: RequestRegistry::new(),
            identity,
            session,
            state: Mutex::new(SessionState::Uninitialized),
            config: Mutex::new(None),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState { *self.state.lock().expect("lock poisoned") }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().expect("lock poisoned") = next;
    }

    /// Configuration negotiated by the handshake, if the session reached
    /// [`SessionState::Active`] through negotiation.
    #[must_use]
    pub fn config(&self) -> Option<SessionConfig> {
        self.config.lock().expect("lock poisoned").clone()
    }

    /// The correlation registry serving this connection.
    #[must_use]
    pub fn registry(&self) -> &RequestRegistry { &self.registry }

    /// The transport became usable.
    ///
    /// With a resumed session, negotiation is skipped entirely: the state
    /// goes straight to [`SessionState::Active`] and any requests queued
    /// before activation are flushed. With a fresh session the state moves
    /// to [`SessionState::Handshaking`] and waits for the key-exchange
    /// layer to signal [`on_handshake_complete`](Self::on_handshake_complete).
    pub async fn on_channel_active(&self) {
        if self.session.is_initialized() {
            debug!("prior session found; skipping negotiation");
            self.set_state(SessionState::Active);
            if let Err(failure) = self.flush_pending().await {
                let failure = self.connection_failure(failure);
                self.registry.broadcast_failure(&failure);
            }
        } else if self.state() == SessionState::Uninitialized {
            debug!("no prior session; negotiation required");
            self.set_state(SessionState::Handshaking);
        }
    }

    /// The lower layer finished its key exchange; negotiate the session.
    ///
    /// Runs the initialisation sequence as one sequential task. Any
    /// failure in the sequence is routed to the registry's
    /// broadcast-failure path, so callers queued behind the handshake
    /// observe a normal request failure instead of a silent hang.
    pub async fn on_handshake_complete(&self) {
        if let Err(failure) = self.negotiate().await {
            warn!(%failure, "connection initialisation failed");
            self.registry.broadcast_failure(&failure);
        }
    }

    async fn negotiate(&self) -> Result<(), RequestError> {
        // Identity problems are configuration errors; abort before any
        // bytes reach the transport.
        self.identity.validate().map_err(RequestError::Handshake)?;

        let request = ProtoObject::InvokeWithLayer {
            layer: SCHEMA_LAYER,
            query: Box::new(ProtoObject::InitConnection {
                identity: self.identity.clone(),
                query: Box::new(ProtoObject::GetConfig),
            }),
        };

        debug!(layer = SCHEMA_LAYER, "sending connection initialisation request");
        let (id, completion) = self.registry.register(request.clone());
        let frame = match self.encode(id, &request) {
            Ok(frame) => frame,
            Err(failure) => {
                self.registry.resolve(id, Err(failure.clone()));
                return Err(failure);
            }
        };
        // The handshake request is the one write allowed while the
        // session is not yet active. Nothing else can claim the entry,
        // but every write goes through the same claim path.
        self.registry.claim_for_send(id);
        self.transport
            .write_and_flush(frame)
            .await
            .map_err(|failure| self.connection_failure(failure))?;

        let reply = completion.wait().await?;
        let config = SessionConfig::try_from(reply).map_err(|_| RequestError::UnexpectedReply)?;
        debug!(dc_id = config.dc_id, "session configuration stored");
        *self.config.lock().expect("lock poisoned") = Some(config);
        self.set_state(SessionState::Active);

        self.flush_pending()
            .await
            .map_err(|failure| self.connection_failure(failure))
    }

    /// Write every entry still awaiting first transmission, in
    /// registration order, followed by a single flush.
    async fn flush_pending(&self) -> Result<(), TransportError> {
        let queued = self.registry.pending_unsent();
        if queued.is_empty() {
            return Ok(());
        }
        debug!(count = queued.len(), "replaying requests queued before activation");
        for (id, request) in queued {
            // The snapshot may be stale: a caller's own send or a
            // cancellation can beat the flush to this entry. Only the
            // claim winner writes.
            if !self.registry.claim_for_send(id) {
                continue;
            }
            match self.encode(id, &request) {
                Ok(frame) => self.transport.write(frame).await?,
                // An unencodable request fails that entry alone.
                Err(failure) => {
                    self.registry.resolve(id, Err(failure));
                }
            }
        }
        self.transport.flush().await
    }

    /// Issue `call` and await its typed reply.
    ///
    /// The request is registered with the correlation registry before any
    /// write, so a response racing the transmission can never be missed.
    /// While the session is not yet active the request stays queued for
    /// the post-handshake replay. Cancellation via `token` is cooperative:
    /// the pending entry resolves as cancelled, but a request already on
    /// the wire is not unsent.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the connection fails, the server
    /// answers with an error envelope, the reply type does not match, or
    /// `token` fires first.
    pub async fn send_request<C: RemoteCall>(
        &self,
        call: C,
        token: CancellationToken,
    ) -> Result<C::Reply, RequestError> {
        let request = call.into_object();
        let (id, completion) = self.registry.register(request.clone());

        // Re-checking the state here races the post-handshake flush: the
        // claim decides which of the two writers transmits the entry.
        if self.state() == SessionState::Active && self.registry.claim_for_send(id) {
            match self.encode(id, &request) {
                Ok(frame) => {
                    if let Err(failure) = self.transport.write_and_flush(frame).await {
                        // Transport failures are connection-wide; the
                        // caller observes the broadcast through its own
                        // pending entry.
                        let failure = self.connection_failure(failure);
                        self.registry.broadcast_failure(&failure);
                    }
                }
                Err(failure) => {
                    self.registry.resolve(id, Err(failure));
                }
            }
        }

        let mut wait = pin!(completion.wait());
        let outcome = tokio::select! {
            () = token.cancelled() => {
                self.registry.cancel(id);
                // The entry is resolved by whichever of cancel or an
                // in-flight response won; either way the completion
                // fires now.
                wait.await
            }
            outcome = &mut wait => outcome,
        };

        let reply = outcome?;
        C::Reply::try_from(reply).map_err(|_| RequestError::UnexpectedReply)
    }

    /// Dispatch one decoded object arriving from the pipeline.
    ///
    /// Called from the connection's inbound task, in frame order.
    /// Correlated responses resolve their pending entry; recognized
    /// control objects are logged; anything else is logged and dropped,
    /// never an error.
    pub fn on_object(&self, object: ProtoObject) {
        match object {
            ProtoObject::RpcResult {
                correlation_id,
                result,
            } => {
                let outcome = match *result {
                    ProtoObject::RpcError { code, message } => {
                        Err(RequestError::Rpc { code, message })
                    }
                    reply => Ok(reply),
                };
                self.registry.resolve(correlation_id, outcome);
            }
            ProtoObject::SessionCreated { session_id } => {
                debug!(session_id, "server opened a new session");
            }
            other => {
                warn!(kind = other.kind(), "unhandled object dropped");
            }
        }
    }

    /// The transport reported an unrecoverable exception.
    ///
    /// Delegates straight to the broadcast-failure path without further
    /// classification; every pending caller receives the same error.
    pub fn on_channel_exception(&self, failure: TransportError) {
        error!(%failure, "transport exception; failing all pending requests");
        let failure = self.connection_failure(failure);
        self.registry.broadcast_failure(&failure);
    }

    fn connection_failure(&self, failure: TransportError) -> RequestError {
        self.set_state(SessionState::Failed);
        RequestError::Connection(Arc::new(failure))
    }

    fn encode(&self, id: u64, request: &ProtoObject) -> Result<Bytes, RequestError> {
        let envelope = Envelope::new(id, request.clone());
        self.serializer
            .serialize(&envelope)
            .map(Bytes::from)
            .map_err(|failure| RequestError::Encode(failure.to_string()))
    }
}

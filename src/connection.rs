//! Per-connection context wiring the decode pipeline to the gateway.
//!
//! A [`Connection`] is constructed once per connected channel and owns
//! everything that channel needs: the ordered [`DecoderPipeline`] and the
//! [`SessionGateway`] with its correlation registry. Inbound frames are
//! fed through [`on_frame`](Connection::on_frame) from the transport's
//! single reader task, preserving wire order; requests are issued from any
//! task via [`send_request`](Connection::send_request).

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{
    decode::{DecoderPipeline, PipelineBuildError},
    gateway::{SessionGateway, SessionState},
    identity::{ClientIdentity, ClientSession},
    proto::{ProtoObject, RemoteCall, SessionConfig},
    registry::RequestError,
    serializer::Serializer,
    transport::{Transport, TransportError},
};

/// One connected channel's runtime: decode pipeline plus session gateway.
pub struct Connection<S, T> {
    pipeline: DecoderPipeline,
    gateway: Arc<SessionGateway<S, T>>,
}

impl<S: Serializer, T: Transport> Connection<S, T> {
    /// Create a connection with the standard decode pipeline.
    pub fn new(
        serializer: S,
        transport: T,
        identity: ClientIdentity,
        session: ClientSession,
    ) -> Self {
        let serializer = Arc::new(serializer);
        let pipeline = DecoderPipeline::standard(Arc::clone(&serializer));
        let gateway = Arc::new(SessionGateway::new(serializer, transport, identity, session));
        Self { pipeline, gateway }
    }

    /// Create a connection with a caller-supplied pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError`] if the stage set is ambiguous.
    pub fn with_pipeline(
        serializer: S,
        transport: T,
        identity: ClientIdentity,
        session: ClientSession,
        stages: Vec<Box<dyn crate::decode::DecodeStage>>,
    ) -> Result<Self, PipelineBuildError> {
        let pipeline = DecoderPipeline::new(stages)?;
        let gateway = Arc::new(SessionGateway::new(
            Arc::new(serializer),
            transport,
            identity,
            session,
        ));
        Ok(Self { pipeline, gateway })
    }

    /// The gateway backing this connection.
    #[must_use]
    pub fn gateway(&self) -> &Arc<SessionGateway<S, T>> { &self.gateway }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.gateway.state() }

    /// Configuration negotiated by the handshake, once available.
    #[must_use]
    pub fn config(&self) -> Option<SessionConfig> { self.gateway.config() }

    /// Decode one inbound frame and dispatch the resulting object.
    ///
    /// A frame that fails to decode is dropped with a log line; subsequent
    /// frames are unaffected.
    pub fn on_frame(&self, frame: Bytes) {
        match self.pipeline.run(frame) {
            Ok(object) => self.gateway.on_object(object),
            Err(failure) => {
                log::warn!("dropping undecodable frame: {failure}");
            }
        }
    }

    /// Dispatch an already-decoded object, bypassing the pipeline.
    pub fn on_object(&self, object: ProtoObject) { self.gateway.on_object(object) }

    /// Forward the transport's connection-active signal.
    pub async fn on_channel_active(&self) { self.gateway.on_channel_active().await }

    /// Forward the key-exchange layer's handshake-complete signal.
    pub async fn on_handshake_complete(&self) { self.gateway.on_handshake_complete().await }

    /// Forward a transport exception; every pending request fails.
    pub fn on_channel_exception(&self, failure: TransportError) {
        self.gateway.on_channel_exception(failure);
    }

    /// Issue `call` and await its typed reply.
    ///
    /// # Errors
    ///
    /// See [`SessionGateway::send_request`].
    pub async fn send_request<C: RemoteCall>(
        &self,
        call: C,
        token: CancellationToken,
    ) -> Result<C::Reply, RequestError> {
        self.gateway.send_request(call, token).await
    }
}

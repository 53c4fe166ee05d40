//! Protocol object set and typed call definitions.
//!
//! Inbound frames decode into a [`ProtoObject`], a closed variant set over
//! the protocol's object kinds. Dispatch is a tagged match over this enum;
//! new kinds are added by extending the variant set rather than by chained
//! type inspection. Outbound requests travel inside an [`Envelope`] carrying
//! the correlation identifier assigned at registration time.

use crate::identity::ClientIdentity;

/// Protocol schema layer negotiated by the connection-initialisation
/// request.
pub const SCHEMA_LAYER: u32 = 133;

/// A decoded protocol value: request, response, notification, configuration
/// or error envelope.
#[derive(bincode::Decode, bincode::Encode, Debug, Clone, PartialEq, Eq)]
pub enum ProtoObject {
    /// Correlated reply to an outbound request. `correlation_id` echoes the
    /// envelope identifier of the request being answered.
    RpcResult {
        correlation_id: u64,
        result: Box<ProtoObject>,
    },
    /// Server-side error envelope, usually nested inside an `RpcResult`.
    RpcError { code: i32, message: String },
    /// Compressed container holding exactly one serialized object.
    GzipPacked { payload: Vec<u8> },
    /// Negotiated session configuration returned by the handshake request.
    Config(SessionConfig),
    /// Layer-negotiation wrapper around an inner query.
    InvokeWithLayer { layer: u32, query: Box<ProtoObject> },
    /// Connection-initialisation call carrying the client identity verbatim.
    InitConnection {
        identity: ClientIdentity,
        query: Box<ProtoObject>,
    },
    /// Configuration-fetch call wrapped by the handshake request.
    GetConfig,
    /// Liveness probe.
    Ping(Ping),
    /// Reply to a [`Ping`].
    Pong(Pong),
    /// Server notification that a new session was opened. Not tied to any
    /// outbound request.
    SessionCreated { session_id: u64 },
}

impl ProtoObject {
    /// Short name of the variant, used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RpcResult { .. } => "rpc_result",
            Self::RpcError { .. } => "rpc_error",
            Self::GzipPacked { .. } => "gzip_packed",
            Self::Config(_) => "config",
            Self::InvokeWithLayer { .. } => "invoke_with_layer",
            Self::InitConnection { .. } => "init_connection",
            Self::GetConfig => "get_config",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::SessionCreated { .. } => "session_created",
        }
    }
}

/// Session configuration negotiated during the handshake and stored by the
/// gateway until the session is renegotiated.
#[derive(bincode::Decode, bincode::Encode, Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Data centre the session is bound to.
    pub dc_id: u32,
    /// Unix timestamp after which the configuration must be refetched.
    pub expires: i64,
    /// Whether the server is running in test mode.
    pub test_mode: bool,
}

impl TryFrom<ProtoObject> for SessionConfig {
    type Error = ProtoObject;

    fn try_from(object: ProtoObject) -> Result<Self, ProtoObject> {
        match object {
            ProtoObject::Config(config) => Ok(config),
            other => Err(other),
        }
    }
}

/// Liveness probe request body.
#[derive(bincode::Decode, bincode::Encode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub ping_id: u64,
}

/// Reply to a [`Ping`], echoing its identifier.
#[derive(bincode::Decode, bincode::Encode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub ping_id: u64,
}

impl TryFrom<ProtoObject> for Pong {
    type Error = ProtoObject;

    fn try_from(object: ProtoObject) -> Result<Self, ProtoObject> {
        match object {
            ProtoObject::Pong(pong) => Ok(pong),
            other => Err(other),
        }
    }
}

/// An outbound call expecting a typed reply.
///
/// The reply type extracts itself from the resolved [`ProtoObject`]; a
/// mismatching object surfaces to the caller as an unexpected-reply error
/// rather than a panic.
pub trait RemoteCall: Send + 'static {
    /// Typed result the server answers this call with.
    type Reply: TryFrom<ProtoObject, Error = ProtoObject> + Send;

    /// Convert the call into its wire object.
    fn into_object(self) -> ProtoObject;
}

/// Configuration-fetch call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetConfig;

impl RemoteCall for GetConfig {
    type Reply = SessionConfig;

    fn into_object(self) -> ProtoObject { ProtoObject::GetConfig }
}

impl RemoteCall for Ping {
    type Reply = Pong;

    fn into_object(self) -> ProtoObject { ProtoObject::Ping(self) }
}

/// Outbound wire unit pairing a request body with its correlation
/// identifier.
///
/// Responses carry the identifier back inside [`ProtoObject::RpcResult`],
/// so only the outbound direction needs the envelope.
#[derive(bincode::Decode, bincode::Encode, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    msg_id: u64,
    body: ProtoObject,
}

impl Envelope {
    /// Create a new [`Envelope`] with the provided identifier and body.
    #[must_use]
    pub fn new(msg_id: u64, body: ProtoObject) -> Self { Self { msg_id, body } }

    /// Correlation identifier assigned to this request.
    #[must_use]
    pub fn msg_id(&self) -> u64 { self.msg_id }

    /// Borrow the request body.
    #[must_use]
    pub fn body(&self) -> &ProtoObject { &self.body }

    /// Consume the envelope and return its body.
    #[must_use]
    pub fn into_body(self) -> ProtoObject { self.body }
}

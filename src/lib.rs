//! Public API for the `mtlink` library.
//!
//! This crate provides the transport-facing runtime of a client for a
//! layered binary protocol: an ordered decode pipeline that unwraps
//! container frames into typed protocol objects, a session gateway that
//! drives the handshake state machine and gates outbound traffic, and a
//! correlation registry that pairs outbound requests with their eventual
//! responses over a single long-lived connection.
//!
//! The socket transport, cryptographic layer and full protocol schema are
//! external collaborators reached through the [`transport::Transport`] and
//! [`serializer::Serializer`] seams.

pub mod connection;
pub mod decode;
pub mod gateway;
pub mod identity;
pub mod proto;
pub mod registry;
pub mod serializer;
pub mod transport;

pub use connection::Connection;
pub use decode::{
    DecodeError,
    DecodeItem,
    DecodeStage,
    DecoderPipeline,
    DeserializeStage,
    GzipUnpackStage,
    PipelineBuildError,
    StageInput,
};
pub use gateway::{SessionGateway, SessionState};
pub use identity::{ClientIdentity, ClientSession, IdentityError};
pub use proto::{
    Envelope,
    GetConfig,
    Ping,
    Pong,
    ProtoObject,
    RemoteCall,
    SCHEMA_LAYER,
    SessionConfig,
};
pub use registry::{Completion, RequestError, RequestOutcome, RequestRegistry};
pub use serializer::{BincodeSerializer, Serializer};
pub use transport::{Transport, TransportError};

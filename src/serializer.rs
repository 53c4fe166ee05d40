//! Wire serialization seam.
//!
//! The [`Serializer`] trait is the boundary to the external schema layer:
//! the runtime only needs to turn an outbound [`Envelope`] into bytes and
//! inbound bytes into a [`ProtoObject`]. A [`BincodeSerializer`] backed by
//! `bincode`'s standard configuration is provided as the default.

use std::error::Error;

use bincode::config;

use crate::proto::{Envelope, ProtoObject};

/// Serializes outbound envelopes and deserializes inbound protocol objects.
///
/// Both operations are treated as total within the protocol schema; any
/// other input fails with the serializer's own error, surfaced through the
/// decode pipeline or the request path.
pub trait Serializer: Send + Sync + 'static {
    /// Serialize an outbound envelope into a byte frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be serialized.
    fn serialize(&self, envelope: &Envelope) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;

    /// Deserialize one protocol object from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to a schema object.
    fn deserialize(&self, bytes: &[u8]) -> Result<ProtoObject, Box<dyn Error + Send + Sync>>;
}

/// Serializer using `bincode` with its standard configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize(&self, envelope: &Envelope) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        bincode::encode_to_vec(envelope, config::standard())
            .map_err(|error| Box::new(error) as Box<dyn Error + Send + Sync>)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ProtoObject, Box<dyn Error + Send + Sync>> {
        let (object, _consumed) = bincode::decode_from_slice(bytes, config::standard())
            .map_err(|error| Box::new(error) as Box<dyn Error + Send + Sync>)?;
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Ping, Pong};

    #[test]
    fn envelope_round_trips() {
        let serializer = BincodeSerializer;
        let envelope = Envelope::new(7, ProtoObject::Ping(Ping { ping_id: 7 }));
        let bytes = serializer.serialize(&envelope).expect("serialize envelope");

        let (decoded, _) = bincode::decode_from_slice::<Envelope, _>(&bytes, config::standard())
            .expect("decode envelope");
        assert_eq!(decoded.msg_id(), 7);
        assert_eq!(decoded.into_body(), ProtoObject::Ping(Ping { ping_id: 7 }));
    }

    #[test]
    fn inbound_object_frame_decodes() {
        let serializer = BincodeSerializer;
        let object = ProtoObject::Pong(Pong { ping_id: 1 });
        let bytes = bincode::encode_to_vec(&object, config::standard()).expect("encode object");
        let decoded = serializer.deserialize(&bytes).expect("decode object");
        assert_eq!(decoded, object);
    }

    #[test]
    fn garbage_bytes_fail_to_deserialize() {
        let serializer = BincodeSerializer;
        assert!(serializer.deserialize(&[0xff, 0xfe, 0xfd]).is_err());
    }
}

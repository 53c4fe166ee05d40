//! Compressed-container unwrap stage.

use std::{io::Read, sync::Arc};

use flate2::read::GzDecoder;
use tracing::debug;

use super::{DecodeError, DecodeItem, DecodeStage, GZIP_STAGE_ORDER, StageInput};
use crate::{proto::ProtoObject, serializer::Serializer};

/// Unwraps a [`ProtoObject::GzipPacked`] container: inflates the embedded
/// blob and re-decodes the bytes into exactly one protocol object.
///
/// Objects of any other kind pass through unchanged.
pub struct GzipUnpackStage<S> {
    serializer: Arc<S>,
}

impl<S> GzipUnpackStage<S> {
    /// Create the stage around the shared serializer.
    #[must_use]
    pub fn new(serializer: Arc<S>) -> Self { Self { serializer } }
}

impl<S: Serializer> DecodeStage for GzipUnpackStage<S> {
    fn order(&self) -> u32 { GZIP_STAGE_ORDER }

    fn input(&self) -> StageInput { StageInput::Object }

    fn decode(&self, item: DecodeItem) -> Result<DecodeItem, DecodeError> {
        let payload = match item {
            DecodeItem::Object(ProtoObject::GzipPacked { payload }) => payload,
            other => return Ok(other),
        };

        let mut inflated = Vec::new();
        GzDecoder::new(payload.as_slice())
            .read_to_end(&mut inflated)
            .map_err(DecodeError::Decompress)?;

        let object = self
            .serializer
            .deserialize(&inflated)
            .map_err(DecodeError::Schema)?;

        // Best-effort trace; must never block or fail the decode.
        debug!(kind = object.kind(), ?object, "unpacked compressed container");

        Ok(DecodeItem::Object(object))
    }
}

//! Ordered decode pipeline turning raw frames into protocol objects.
//!
//! Stages are totally ordered by an integer priority fixed at construction
//! time: [`DecoderPipeline::new`] sorts the stages once and rejects
//! ambiguous orderings, so there is no runtime priority scanning. Each
//! stage may consume and replace the current item or pass it through
//! unchanged. A failure aborts processing of that frame only; the pipeline
//! holds no per-frame state and decodes subsequent frames normally.

mod gzip;

use std::{error::Error, sync::Arc};

use bytes::Bytes;

pub use self::gzip::GzipUnpackStage;
use crate::{proto::ProtoObject, serializer::Serializer};

/// Pipeline position of the serializer stage.
pub const DESERIALIZE_STAGE_ORDER: u32 = 10;
/// Pipeline position of the compressed-container unwrap stage.
pub const GZIP_STAGE_ORDER: u32 = 50;

/// A frame is bad: decompression or schema decoding failed, or the
/// pipeline finished without producing an object. Scoped to one frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The compressed payload could not be inflated.
    #[error("failed to decompress packed payload: {0}")]
    Decompress(#[source] std::io::Error),
    /// The bytes do not decode to a schema object.
    #[error("failed to decode protocol object")]
    Schema(#[source] Box<dyn Error + Send + Sync>),
    /// Every stage ran and the frame still is not a protocol object.
    #[error("frame passed through the pipeline without producing an object")]
    Unterminated,
}

/// The stage set handed to [`DecoderPipeline::new`] is ambiguous.
#[derive(Debug, thiserror::Error)]
pub enum PipelineBuildError {
    /// Two stages claim the same priority for the same input kind.
    #[error("two stages claim order {order} for {input:?} input")]
    DuplicateOrder {
        /// The contested priority.
        order: u32,
        /// The input kind both stages consume.
        input: StageInput,
    },
}

/// Kind of item a stage consumes. Items of the other kind bypass the
/// stage untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// Raw frame bytes not yet decoded.
    Bytes,
    /// An already-decoded protocol object.
    Object,
}

/// Value travelling through the pipeline: raw bytes until a stage decodes
/// them, a protocol object afterwards.
#[derive(Debug)]
pub enum DecodeItem {
    /// Undecoded frame bytes.
    Bytes(Bytes),
    /// A decoded protocol object.
    Object(ProtoObject),
}

impl DecodeItem {
    fn kind(&self) -> StageInput {
        match self {
            Self::Bytes(_) => StageInput::Bytes,
            Self::Object(_) => StageInput::Object,
        }
    }
}

/// One transform in the decode chain.
pub trait DecodeStage: Send + Sync {
    /// Position in the pipeline; stages run in ascending order.
    fn order(&self) -> u32;

    /// Kind of item this stage consumes.
    fn input(&self) -> StageInput;

    /// Transform `item`, either replacing it or returning it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the item cannot be decoded; the
    /// pipeline abandons the current frame and reports upstream.
    fn decode(&self, item: DecodeItem) -> Result<DecodeItem, DecodeError>;
}

/// Ordered chain of [`DecodeStage`]s.
pub struct DecoderPipeline {
    stages: Vec<Box<dyn DecodeStage>>,
}

impl std::fmt::Debug for DecoderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderPipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl DecoderPipeline {
    /// Build a pipeline from `stages`, fixing their execution order once.
    ///
    /// Stages are sorted ascending by [`DecodeStage::order`]. Two stages
    /// with the same order *and* the same input kind are ambiguous and
    /// rejected; stages that tie on order but consume different input
    /// kinds keep their declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineBuildError::DuplicateOrder`] for an ambiguous
    /// stage set.
    pub fn new(mut stages: Vec<Box<dyn DecodeStage>>) -> Result<Self, PipelineBuildError> {
        stages.sort_by_key(|stage| stage.order());
        for pair in stages.windows(2) {
            if pair[0].order() == pair[1].order() && pair[0].input() == pair[1].input() {
                return Err(PipelineBuildError::DuplicateOrder {
                    order: pair[0].order(),
                    input: pair[0].input(),
                });
            }
        }
        Ok(Self { stages })
    }

    /// Build the standard inbound pipeline: serializer stage followed by
    /// the compressed-container unwrap stage.
    pub fn standard<S: Serializer>(serializer: Arc<S>) -> Self {
        let stages: Vec<Box<dyn DecodeStage>> = vec![
            Box::new(DeserializeStage::new(Arc::clone(&serializer))),
            Box::new(GzipUnpackStage::new(serializer)),
        ];
        // The built-in stage orders are distinct constants.
        Self::new(stages).expect("built-in stages have distinct orders")
    }

    /// Decode one frame into a protocol object.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if any stage fails or the frame never
    /// becomes an object. The error is scoped to this frame.
    pub fn run(&self, frame: Bytes) -> Result<ProtoObject, DecodeError> {
        let mut item = DecodeItem::Bytes(frame);
        for stage in &self.stages {
            if stage.input() == item.kind() {
                item = stage.decode(item)?;
            }
        }
        match item {
            DecodeItem::Object(object) => Ok(object),
            DecodeItem::Bytes(_) => Err(DecodeError::Unterminated),
        }
    }
}

/// First stage of the standard pipeline: hands raw frame bytes to the
/// schema serializer.
pub struct DeserializeStage<S> {
    serializer: Arc<S>,
}

impl<S> DeserializeStage<S> {
    /// Create the stage around the shared serializer.
    #[must_use]
    pub fn new(serializer: Arc<S>) -> Self { Self { serializer } }
}

impl<S: Serializer> DecodeStage for DeserializeStage<S> {
    fn order(&self) -> u32 { DESERIALIZE_STAGE_ORDER }

    fn input(&self) -> StageInput { StageInput::Bytes }

    fn decode(&self, item: DecodeItem) -> Result<DecodeItem, DecodeError> {
        let bytes = match item {
            DecodeItem::Bytes(bytes) => bytes,
            other => return Ok(other),
        };
        let object = self
            .serializer
            .deserialize(&bytes)
            .map_err(DecodeError::Schema)?;
        Ok(DecodeItem::Object(object))
    }
}

#[cfg(test)]
mod tests;

//! Unit tests for pipeline construction and the standard stages.

use std::io::Write;

use bincode::config;
use flate2::{Compression, write::GzEncoder};

use super::*;
use crate::{
    proto::{Ping, Pong, SessionConfig},
    serializer::BincodeSerializer,
};

fn object_frame(object: &ProtoObject) -> Bytes {
    Bytes::from(bincode::encode_to_vec(object, config::standard()).expect("encode object"))
}

fn pack(object: &ProtoObject) -> Bytes {
    let plain = bincode::encode_to_vec(object, config::standard()).expect("encode object");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain).expect("compress object");
    let payload = encoder.finish().expect("finish gzip stream");
    object_frame(&ProtoObject::GzipPacked { payload })
}

fn pipeline() -> DecoderPipeline {
    DecoderPipeline::standard(Arc::new(BincodeSerializer))
}

#[test]
fn plain_frame_decodes_to_object() {
    let object = ProtoObject::Pong(Pong { ping_id: 11 });
    let decoded = pipeline().run(object_frame(&object)).expect("decode frame");
    assert_eq!(decoded, object);
}

#[test]
fn packed_frame_unwraps_to_inner_object() {
    let inner = ProtoObject::Config(SessionConfig {
        dc_id: 4,
        expires: 1_700_000_000,
        test_mode: true,
    });
    let decoded = pipeline().run(pack(&inner)).expect("decode packed frame");
    assert_eq!(decoded, inner);
}

#[test]
fn corrupt_gzip_payload_fails_with_decompress_error() {
    let frame = object_frame(&ProtoObject::GzipPacked {
        payload: vec![0x1f, 0x8b, 0xff, 0x00, 0x01],
    });
    let error = pipeline().run(frame).expect_err("corrupt payload must fail");
    assert!(matches!(error, DecodeError::Decompress(_)));
}

#[test]
fn failed_frame_does_not_poison_the_next_one() {
    let subject = pipeline();
    let bad = object_frame(&ProtoObject::GzipPacked {
        payload: vec![0xde, 0xad],
    });
    assert!(subject.run(bad).is_err());

    let good = ProtoObject::Ping(Ping { ping_id: 2 });
    let decoded = subject
        .run(object_frame(&good))
        .expect("well-formed frame after a failure");
    assert_eq!(decoded, good);
}

#[test]
fn schema_garbage_fails_with_schema_error() {
    let error = pipeline()
        .run(Bytes::from_static(&[0xff, 0xfe, 0xfd, 0xfc]))
        .expect_err("garbage must fail");
    assert!(matches!(error, DecodeError::Schema(_)));
}

struct NoopStage {
    order: u32,
    input: StageInput,
}

impl DecodeStage for NoopStage {
    fn order(&self) -> u32 { self.order }

    fn input(&self) -> StageInput { self.input }

    fn decode(&self, item: DecodeItem) -> Result<DecodeItem, DecodeError> { Ok(item) }
}

#[test]
fn duplicate_order_for_same_input_is_rejected() {
    let stages: Vec<Box<dyn DecodeStage>> = vec![
        Box::new(NoopStage {
            order: 50,
            input: StageInput::Object,
        }),
        Box::new(NoopStage {
            order: 50,
            input: StageInput::Object,
        }),
    ];
    let error = DecoderPipeline::new(stages).expect_err("ambiguous ordering must be rejected");
    assert!(matches!(
        error,
        PipelineBuildError::DuplicateOrder {
            order: 50,
            input: StageInput::Object,
        }
    ));
}

#[test]
fn equal_order_across_input_kinds_is_allowed() {
    let stages: Vec<Box<dyn DecodeStage>> = vec![
        Box::new(NoopStage {
            order: 50,
            input: StageInput::Bytes,
        }),
        Box::new(NoopStage {
            order: 50,
            input: StageInput::Object,
        }),
    ];
    assert!(DecoderPipeline::new(stages).is_ok());
}

#[test]
fn bytes_only_pipeline_never_terminates_a_frame() {
    let stages: Vec<Box<dyn DecodeStage>> = vec![Box::new(NoopStage {
        order: 1,
        input: StageInput::Bytes,
    })];
    let subject = DecoderPipeline::new(stages).expect("build pipeline");
    let error = subject
        .run(Bytes::from_static(b"raw"))
        .expect_err("no stage produced an object");
    assert!(matches!(error, DecodeError::Unterminated));
}

#[test]
fn stages_run_in_ascending_order_regardless_of_declaration() {
    // Declare the unwrap stage before the serializer stage; construction
    // must still run the serializer first.
    let serializer = Arc::new(BincodeSerializer);
    let stages: Vec<Box<dyn DecodeStage>> = vec![
        Box::new(GzipUnpackStage::new(Arc::clone(&serializer))),
        Box::new(DeserializeStage::new(serializer)),
    ];
    let subject = DecoderPipeline::new(stages).expect("build pipeline");

    let inner = ProtoObject::Pong(Pong { ping_id: 8 });
    let decoded = subject.run(pack(&inner)).expect("decode packed frame");
    assert_eq!(decoded, inner);
}

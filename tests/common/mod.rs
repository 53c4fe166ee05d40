//! Shared fixtures for integration tests: a recording mock transport and
//! wiring helpers.
#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bincode::config;
use bytes::Bytes;
use mtlink::{
    ClientIdentity,
    Envelope,
    ProtoObject,
    SessionConfig,
    Transport,
    TransportError,
};

/// Transport double recording every write and flush; can be switched into
/// a failing mode to simulate a dead connection.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    writes: Mutex<Vec<Bytes>>,
    flushes: AtomicUsize,
    failing: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self { Self::default() }

    /// Make every subsequent write and flush fail with
    /// [`TransportError::Closed`].
    pub fn fail_writes(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.lock().expect("lock poisoned").len()
    }

    pub fn flush_count(&self) -> usize { self.inner.flushes.load(Ordering::SeqCst) }

    /// Decode every recorded write back into an [`Envelope`].
    pub fn written_envelopes(&self) -> Vec<Envelope> {
        self.inner
            .writes
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|frame| {
                let (envelope, _) = bincode::decode_from_slice(frame, config::standard())
                    .expect("recorded frame decodes as an envelope");
                envelope
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner.writes.lock().expect("lock poisoned").push(frame);
        Ok(())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A complete identity that passes validation.
pub fn identity() -> ClientIdentity {
    ClientIdentity {
        api_id: 17349,
        device_model: "PC 64bit".into(),
        system_version: "Linux 6.1".into(),
        app_version: "1.0.0".into(),
        lang_code: "en".into(),
        lang_pack: "desktop".into(),
        system_lang_code: "en-US".into(),
    }
}

/// A plausible negotiated configuration.
pub fn config() -> SessionConfig {
    SessionConfig {
        dc_id: 2,
        expires: 1_800_000_000,
        test_mode: false,
    }
}

/// Wrap `result` in the response envelope the server would send.
pub fn rpc_result(correlation_id: u64, result: ProtoObject) -> ProtoObject {
    ProtoObject::RpcResult {
        correlation_id,
        result: Box::new(result),
    }
}

/// Serialize `object` the way an inbound frame carries it.
pub fn object_frame(object: &ProtoObject) -> Bytes {
    Bytes::from(bincode::encode_to_vec(object, config::standard()).expect("encode object"))
}

/// Install a subscriber so `tracing` output lands in the test harness's
/// captured output. Safe to call from every test; only the first call
/// wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Busy-wait (cooperatively) until `condition` holds, failing the test
/// after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

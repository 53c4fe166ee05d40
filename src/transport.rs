//! Transport collaborator seam.
//!
//! The runtime depends only on this trait, never on a concrete socket
//! implementation. The connection's lifecycle callbacks
//! ([`crate::connection::Connection::on_channel_active`] and
//! [`crate::connection::Connection::on_channel_exception`]) are driven by
//! whatever owns the transport's event loop.

use async_trait::async_trait;
use bytes::Bytes;

/// I/O-layer failure. Connection-wide: any occurrence triggers a broadcast
/// failure of every pending request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Underlying I/O failure.
    #[error("transport I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// The connection is no longer writable.
    #[error("connection closed")]
    Closed,
}

/// Write side of a connected channel.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Queue `frame` for transmission without forcing a flush.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the frame cannot be written.
    async fn write(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Flush previously written frames to the wire.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the flush fails.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Write `frame` and flush in one step.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if either the write or the flush fails.
    async fn write_and_flush(&self, frame: Bytes) -> Result<(), TransportError> {
        self.write(frame).await?;
        self.flush().await
    }
}

//! Transport abstraction for duplex text connections.
//!
//! The protocol only needs an ordered, reliable stream of text frames in both
//! directions. Production uses a line-framed TCP stream, tests use the
//! in-memory mock clearing node, and both look identical to the driver.

use std::io;

use async_trait::async_trait;

/// Factory for duplex text connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Outbound half of a connection.
    type Sink: TransportSink;

    /// Inbound half of a connection.
    type Stream: TransportStream;

    /// Open a connection to `endpoint`.
    ///
    /// Returns once the link is usable. The caller applies its own timeout.
    async fn connect(&self, endpoint: &str) -> io::Result<(Self::Sink, Self::Stream)>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait TransportSink: Send + 'static {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> io::Result<()>;

    /// Close the link. Closing twice is not an error.
    async fn close(&mut self) -> io::Result<()>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait TransportStream: Send + 'static {
    /// Next text frame, or `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the driver polls it inside `select!`.
    async fn recv(&mut self) -> io::Result<Option<String>>;
}

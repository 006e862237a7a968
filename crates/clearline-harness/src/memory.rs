//! In-memory duplex link.

use std::io;

use async_trait::async_trait;
use clearline_core::{TransportSink, TransportStream};
use tokio::sync::mpsc;

/// Sending half of an in-memory link. Dropping or closing it ends the
/// peer's stream.
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

/// Receiving half of an in-memory link.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Two connected endpoints: frames sent on one side arrive on the other.
pub fn memory_link() -> ((MemorySink, MemoryStream), (MemorySink, MemoryStream)) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        (MemorySink { tx: Some(a_tx) }, MemoryStream { rx: b_rx }),
        (MemorySink { tx: Some(b_tx) }, MemoryStream { rx: a_rx }),
    )
}

#[async_trait]
impl TransportSink for MemorySink {
    async fn send(&mut self, frame: String) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "link closed"))?;
        tx.send(frame).map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl TransportStream for MemoryStream {
    async fn recv(&mut self) -> io::Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

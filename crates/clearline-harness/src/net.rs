//! Network serving for the mock node.
//!
//! [`serve_tcp`] puts a [`MockClearingNode`] behind a real TCP listener, and
//! [`serve_turmoil`] does the same inside a turmoil simulation. Both frame
//! the stream with newline-delimited JSON, so a [`TcpTransport`] or a
//! [`TurmoilTransport`] client talks to them unchanged.
//!
//! [`TcpTransport`]: clearline_client::TcpTransport

use std::io;

use async_trait::async_trait;
use clearline_client::{LineSink, LineStream, split_lines};
use clearline_core::Transport;
use tokio::io::{ReadHalf, WriteHalf};
use tracing::{debug, info};

use crate::node::MockClearingNode;

/// Accept connections forever, one node session per connection.
pub async fn serve_tcp(node: MockClearingNode, listener: tokio::net::TcpListener) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "mock node listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        let (sink, stream) = split_lines(stream);
        let node = node.clone();
        tokio::spawn(async move { node.serve(sink, stream).await });
    }
}

/// Accept simulated connections forever, one node session per connection.
pub async fn serve_turmoil(
    node: MockClearingNode,
    listener: turmoil::net::TcpListener,
) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted simulated connection");
        let (sink, stream) = split_lines(stream);
        let node = node.clone();
        tokio::spawn(async move { node.serve(sink, stream).await });
    }
}

/// Line-framed JSON over turmoil's simulated TCP.
///
/// Endpoints are `host:port` names known to the simulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurmoilTransport;

type SimStream = turmoil::net::TcpStream;

#[async_trait]
impl Transport for TurmoilTransport {
    type Sink = LineSink<WriteHalf<SimStream>>;
    type Stream = LineStream<ReadHalf<SimStream>>;

    async fn connect(&self, endpoint: &str) -> io::Result<(Self::Sink, Self::Stream)> {
        let address = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
        let stream = SimStream::connect(address).await?;
        Ok(split_lines(stream))
    }
}

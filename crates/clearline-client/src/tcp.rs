//! Newline-delimited JSON over a byte stream.
//!
//! Envelopes are compact JSON, which never contains a raw newline, so one
//! line is exactly one frame. [`split_lines`] works over any tokio byte
//! stream; [`TcpTransport`] applies it to TCP.

use std::io;

use async_trait::async_trait;
use clearline_core::{Transport, TransportSink, TransportStream};
use tokio::{
    io::{
        AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf,
        WriteHalf,
    },
    net::TcpStream,
};
use tracing::debug;

/// Writing half of a line-framed stream.
pub struct LineSink<W> {
    writer: W,
    closed: bool,
}

/// Reading half of a line-framed stream.
pub struct LineStream<R> {
    lines: Lines<BufReader<R>>,
}

/// Split a byte stream into line-framed halves.
pub fn split_lines<S>(stream: S) -> (LineSink<WriteHalf<S>>, LineStream<ReadHalf<S>>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    (LineSink { writer, closed: false }, LineStream { lines: BufReader::new(reader).lines() })
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> TransportSink for LineSink<W> {
    async fn send(&mut self, frame: String) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        let mut line = frame.into_bytes();
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> TransportStream for LineStream<R> {
    async fn recv(&mut self) -> io::Result<Option<String>> {
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => {},
                other => return Ok(other),
            }
        }
    }
}

/// Line-framed JSON over TCP.
///
/// Endpoints are `host:port`, optionally prefixed with `tcp://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    type Sink = LineSink<WriteHalf<TcpStream>>;
    type Stream = LineStream<ReadHalf<TcpStream>>;

    async fn connect(&self, endpoint: &str) -> io::Result<(Self::Sink, Self::Stream)> {
        let address = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!(%address, "tcp link established");
        Ok(split_lines(stream))
    }
}

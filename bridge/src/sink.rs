//! Downstream command sink.
//!
//! The bridge only speaks the textual command protocol; executing the
//! commands against the device-management target is the external command
//! process's job. `LineSink` writes one command per line to any async writer
//! (stdout, a pipe to the executor, a socket); `ChannelSink` hands commands
//! to an in-process consumer, which is also what the tests use.

use async_trait::async_trait;
use signalbridge_common::{BridgeError, Command, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

#[async_trait]
pub trait CommandSink: Send {
    async fn send(&mut self, command: Command) -> Result<()>;
}

/// Writes the line protocol to an `AsyncWrite`, flushing per command so the
/// external executor sees each line as soon as it is emitted.
pub struct LineSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CommandSink for LineSink<W> {
    async fn send(&mut self, command: Command) -> Result<()> {
        let line = format!("{}\n", command);
        debug!("-> {}", command);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Forwards commands over an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CommandSink for ChannelSink {
    async fn send(&mut self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| BridgeError::ChannelSend)
    }
}

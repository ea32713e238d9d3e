// THEORY:
// Concrete `Transport`s. Discovery and pairing of the wearable are somebody else's
// problem: by the time a transport is built, the caller already holds a writable
// stream to the device (an RFCOMM serial node, a socket) or has decided there is
// none.
//
// - `LineTransport` speaks the wearable's wire contract: one token per line.
// - `TracingTransport` only logs. It stands in for hardware during development.
// - `MemoryTransport` records deliveries and can be made unreachable or slow. It is
//   the harness the engine's own tests run against.

use crate::core_modules::color::VibrationCommand;
use crate::core_modules::notification::{ChannelCommand, Transport};
use crate::error::NotifyError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::info;

/// Writes newline-terminated vibration tokens to any async byte sink.
pub struct LineTransport<W> {
    writer: W,
}

impl<W> LineTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> Transport<VibrationCommand> for LineTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn deliver(&mut self, command: VibrationCommand) -> Result<(), NotifyError> {
        self.writer.write_all(command.wire_line().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Logs every command instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct TracingTransport {
    label: String,
}

impl TracingTransport {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl<C: ChannelCommand> Transport<C> for TracingTransport {
    async fn deliver(&mut self, command: C) -> Result<(), NotifyError> {
        info!(target: "chroma_vision::mock_device", device = %self.label, %command, "mock delivery");
        Ok(())
    }
}

struct LogState<C> {
    delivered: Vec<C>,
    reachable: bool,
}

/// Shared view of what a `MemoryTransport` has delivered.
pub struct TransportLog<C> {
    state: Arc<Mutex<LogState<C>>>,
}

impl<C> Clone for TransportLog<C> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<C: Clone> TransportLog<C> {
    pub fn delivered(&self) -> Vec<C> {
        self.state.lock().delivered.clone()
    }

    /// An unreachable transport fails every delivery with a transient error.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }
}

/// Holds deliveries back while closed.
#[derive(Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }
}

/// In-memory transport that records every successful delivery.
pub struct MemoryTransport<C> {
    state: Arc<Mutex<LogState<C>>>,
    gate: Arc<watch::Sender<bool>>,
}

impl<C> MemoryTransport<C> {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(LogState {
                delivered: Vec::new(),
                reachable: true,
            })),
            gate: Arc::new(gate),
        }
    }

    pub fn log(&self) -> TransportLog<C> {
        TransportLog { state: self.state.clone() }
    }

    pub fn gate(&self) -> Gate {
        Gate { open: self.gate.clone() }
    }
}

impl<C> Default for MemoryTransport<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ChannelCommand> Transport<C> for MemoryTransport<C> {
    async fn deliver(&mut self, command: C) -> Result<(), NotifyError> {
        let mut open = self.gate.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(NotifyError::transient("gate dropped"));
        }
        let mut state = self.state.lock();
        if !state.reachable {
            return Err(NotifyError::transient("device unreachable"));
        }
        state.delivered.push(command);
        Ok(())
    }
}

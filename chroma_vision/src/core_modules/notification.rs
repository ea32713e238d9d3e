// THEORY:
// A `NotificationChannel` is the boundary between the deterministic tick loop and a
// slow, unreliable transport (a Bluetooth serial link, a sound device). It follows
// the same actor shape the engine uses elsewhere: the producer side only enqueues,
// and one spawned task owns the transport and drains the queue.
//
// Key guarantees:
// 1.  **Non-blocking**: `dispatch` pushes into a bounded mailbox and returns. A hung
//     transport stalls its own worker, never the tick.
// 2.  **Ordering**: one consumer per channel, FIFO. Command N+1 cannot reach the
//     device before command N.
// 3.  **Freshness**: when the mailbox is full the stale backlog is dropped and only
//     the newest command is kept. Only the latest approved state matters.
// 4.  **Best effort**: delivery failures are logged and published as a
//     `ChannelStatus`. They never travel back to the caller.
// 5.  **Mute**: a disabled channel accepts and discards everything, returning
//     success, so the state machine keeps its debounce history in step. While
//     muted the published status stays `Disabled`; the worker does not overwrite it.

use crate::core_modules::color::{AudioCommand, VibrationCommand};
use crate::error::NotifyError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A command type that can travel through a channel.
pub trait ChannelCommand: Copy + PartialEq + Send + Sync + fmt::Display + fmt::Debug + 'static {
    /// Whether delivering the same command twice in a row is redundant.
    const COLLAPSE_REPEATS: bool;

    /// Control commands are always delivered, repeat or not.
    fn is_control(&self) -> bool {
        false
    }
}

impl ChannelCommand for VibrationCommand {
    const COLLAPSE_REPEATS: bool = true;

    fn is_control(&self) -> bool {
        VibrationCommand::is_control(self)
    }
}

impl ChannelCommand for AudioCommand {
    const COLLAPSE_REPEATS: bool = false;
}

/// The physical side of a channel. Owned by exactly one worker task.
pub trait Transport<C>: Send + 'static {
    fn deliver(&mut self, command: C) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Audio,
    Vibration,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Audio => write!(f, "audio"),
            ChannelKind::Vibration => write!(f, "vibration"),
        }
    }
}

/// Health of the transport behind a channel, as last observed by its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// No transport was ever initialized. The channel is disabled for good.
    Unavailable,
    /// Muted by the user.
    Disabled,
    /// Transport present, nothing delivered yet.
    Ready,
    /// Last delivery succeeded.
    Connected,
    /// Last delivery failed.
    Failed(String),
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Unavailable => write!(f, "Disabled (unavailable)"),
            ChannelStatus::Disabled => write!(f, "Disabled"),
            ChannelStatus::Ready => write!(f, "Not Connected"),
            ChannelStatus::Connected => write!(f, "Connected"),
            ChannelStatus::Failed(reason) => write!(f, "Error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Mailbox bound before the backlog is coalesced.
    pub capacity: usize,
    /// Upper bound on a single delivery.
    pub delivery_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

struct Mailbox<C> {
    queue: VecDeque<C>,
    closed: bool,
}

struct Shared<C> {
    mailbox: Mutex<Mailbox<C>>,
    wake: Notify,
    capacity: usize,
    muted: AtomicBool,
}

impl<C> Shared<C> {
    fn close(&self) {
        self.mailbox.lock().closed = true;
        self.wake.notify_one();
    }
}

/// Producer handle of one notification channel.
pub struct NotificationChannel<C: ChannelCommand> {
    kind: ChannelKind,
    shared: Option<Arc<Shared<C>>>,
    enabled: bool,
    status: Arc<watch::Sender<ChannelStatus>>,
    worker: Option<JoinHandle<()>>,
}

pub type AudioChannel = NotificationChannel<AudioCommand>;
pub type VibrationChannel = NotificationChannel<VibrationCommand>;

impl<C: ChannelCommand> NotificationChannel<C> {
    /// Spawns the worker that owns `transport`. Must be called inside a tokio runtime.
    pub fn spawn<T: Transport<C>>(kind: ChannelKind, transport: T, config: ChannelConfig) -> Self {
        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox {
                queue: VecDeque::with_capacity(config.capacity),
                closed: false,
            }),
            wake: Notify::new(),
            capacity: config.capacity.max(1),
            muted: AtomicBool::new(false),
        });
        let (status_tx, _) = watch::channel(ChannelStatus::Ready);
        let status = Arc::new(status_tx);

        let worker = tokio::spawn(run_worker(
            kind,
            shared.clone(),
            transport,
            status.clone(),
            config.delivery_timeout,
        ));

        Self {
            kind,
            shared: Some(shared),
            enabled: true,
            status,
            worker: Some(worker),
        }
    }

    /// A channel whose transport could not be initialized. It stays disabled for good.
    pub fn unavailable(kind: ChannelKind) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::Unavailable);
        Self {
            kind,
            shared: None,
            enabled: false,
            status: Arc::new(status_tx),
            worker: None,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn is_available(&self) -> bool {
        self.shared.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }

    /// Number of commands waiting for the worker.
    pub fn pending(&self) -> usize {
        self.shared
            .as_ref()
            .map_or(0, |shared| shared.mailbox.lock().queue.len())
    }

    /// Hands `command` to the worker. Returns immediately.
    ///
    /// A muted channel swallows the command and reports success.
    pub fn dispatch(&self, command: C) -> Result<(), NotifyError> {
        if self.shared.is_none() {
            return Err(NotifyError::Unavailable);
        }
        if !self.enabled {
            debug!(channel = %self.kind, %command, "channel muted, command dropped");
            return Ok(());
        }
        self.enqueue(command)
    }

    fn enqueue(&self, command: C) -> Result<(), NotifyError> {
        let shared = self.shared.as_ref().ok_or(NotifyError::Unavailable)?;
        {
            let mut mailbox = shared.mailbox.lock();
            if mailbox.closed {
                return Err(NotifyError::transient("channel is shut down"));
            }
            if mailbox.queue.len() >= shared.capacity {
                warn!(
                    channel = %self.kind,
                    dropped = mailbox.queue.len(),
                    %command,
                    "mailbox full, coalescing backlog to newest command"
                );
                mailbox.queue.clear();
            }
            mailbox.queue.push_back(command);
        }
        shared.wake.notify_one();
        Ok(())
    }

    /// Flips the mute flag. Returns whether anything changed.
    fn toggle(&mut self, enabled: bool) -> bool {
        if self.shared.is_none() {
            if enabled {
                warn!(channel = %self.kind, "cannot enable an unavailable channel");
            }
            return false;
        }
        if self.enabled == enabled {
            return false;
        }
        self.enabled = enabled;
        if let Some(shared) = &self.shared {
            shared.muted.store(!enabled, Ordering::Release);
        }
        self.status.send_replace(if enabled {
            ChannelStatus::Ready
        } else {
            ChannelStatus::Disabled
        });
        info!(channel = %self.kind, enabled, "channel toggled");
        true
    }

    /// Closes the mailbox and waits until the worker has drained it.
    pub async fn shutdown(mut self) {
        if let Some(shared) = &self.shared {
            shared.close();
        }
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(channel = %self.kind, error = %err, "channel worker ended abnormally");
            }
        }
    }
}

impl NotificationChannel<VibrationCommand> {
    pub fn send(&self, command: VibrationCommand) -> Result<(), NotifyError> {
        self.dispatch(command)
    }

    /// Muting tells the wearable `VIB_OFF` first; unmuting tells it `VIB_ON`.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        if !self.is_available() || self.enabled == enabled {
            return self.toggle(enabled);
        }
        if enabled {
            self.toggle(true);
            self.announce(VibrationCommand::VibrationEnable);
        } else {
            self.announce(VibrationCommand::VibrationDisable);
            self.toggle(false);
        }
        true
    }

    fn announce(&self, command: VibrationCommand) {
        if let Err(err) = self.enqueue(command) {
            warn!(channel = %self.kind, %command, error = %err, "control token not queued");
        }
    }
}

impl NotificationChannel<AudioCommand> {
    pub fn play(&self, command: AudioCommand) -> Result<(), NotifyError> {
        self.dispatch(command)
    }

    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        self.toggle(enabled)
    }
}

impl<C: ChannelCommand> Drop for NotificationChannel<C> {
    fn drop(&mut self) {
        // Let a detached worker finish its backlog and exit.
        if let Some(shared) = &self.shared {
            shared.close();
        }
    }
}

async fn run_worker<C, T>(
    kind: ChannelKind,
    shared: Arc<Shared<C>>,
    mut transport: T,
    status: Arc<watch::Sender<ChannelStatus>>,
    delivery_timeout: Duration,
) where
    C: ChannelCommand,
    T: Transport<C>,
{
    let mut last_delivered: Option<C> = None;
    loop {
        let next = {
            let mut mailbox = shared.mailbox.lock();
            match mailbox.queue.pop_front() {
                Some(command) => Some(command),
                None if mailbox.closed => break,
                None => None,
            }
        };
        let Some(command) = next else {
            shared.wake.notified().await;
            continue;
        };

        if C::COLLAPSE_REPEATS && !command.is_control() && last_delivered == Some(command) {
            debug!(channel = %kind, %command, "repeat of last delivered command skipped");
            continue;
        }

        match tokio::time::timeout(delivery_timeout, transport.deliver(command)).await {
            Ok(Ok(())) => {
                last_delivered = Some(command);
                publish(&shared, &status, ChannelStatus::Connected);
                info!(channel = %kind, %command, "command delivered");
            }
            Ok(Err(err)) => {
                warn!(channel = %kind, %command, error = %err, "delivery failed");
                publish(&shared, &status, ChannelStatus::Failed(err.to_string()));
            }
            Err(_) => {
                let err = NotifyError::transient(format!("timed out after {delivery_timeout:?}"));
                warn!(channel = %kind, %command, error = %err, "delivery failed");
                publish(&shared, &status, ChannelStatus::Failed(err.to_string()));
            }
        }
    }
    debug!(channel = %kind, "channel worker stopped");
}

/// Transport health only replaces the status while the channel is unmuted.
fn publish<C>(shared: &Shared<C>, status: &watch::Sender<ChannelStatus>, next: ChannelStatus) {
    if !shared.muted.load(Ordering::Acquire) {
        status.send_replace(next);
    }
}

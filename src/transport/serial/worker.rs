//! Per-connection machinery: the read loop, the write loop, the watchdog,
//! and the exchange.
//!
//! ```text
//!            frame                    bytes
//! exchange ─────────► write loop ──► port ◄───────── board
//!    ▲  │                             │
//!    │  │ Arm/Disarm           read loop (blocking thread)
//!    │  ▼                       │            │
//!    │ watchdog ◄──── ping ─────┘            │
//!    │  │                                    │
//!    │  └── dead ──┐          response ──────┘
//!    └─────────────┴─────────────┘
//! ```
//!
//! Both port loops run on blocking threads, so a stuck port never stalls the
//! runtime. Each wait in an exchange is one `select!` over the awaited event,
//! the watchdog declaring the link dead, and the caller's context.

use std::io::{self, Read, Write};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SerialConfig;
use crate::context::Context;
use crate::error::{BoardError, Result};
use crate::events::{BoardEvent, EventBus};
use crate::traits::SerialLink;

const READ_CHUNK: usize = 256;

/// Line as received from the board, or the read error that stopped the loop.
type Response = io::Result<String>;

/// Requests sent from the exchange to the watchdog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchdogCommand {
    /// A command was written; start (or restart) the silence timer.
    Arm,
    /// The exchange finished; go idle.
    Disarm,
}

/// One frame for the write loop, with the channel that reports the outcome.
struct WriteRequest {
    frame: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
}

/// One open connection: the port loops, the watchdog, and their channels.
///
/// Dropping a `Link` signals the workers to stop. [`Link::close`] also waits
/// for them, which guarantees the port is released before it is reopened.
pub(crate) struct Link {
    writes: Option<mpsc::UnboundedSender<WriteRequest>>,
    responses: mpsc::UnboundedReceiver<Response>,
    watchdog: mpsc::UnboundedSender<WatchdogCommand>,
    dead: watch::Receiver<bool>,
    shutdown: watch::Sender<bool>,
    response_timeout: Duration,
    /// Frames written whose answer has not been consumed yet. Answers owed
    /// to abandoned exchanges are discarded before one is accepted.
    owed: usize,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    watchdog_task: Option<JoinHandle<()>>,
}

impl Link {
    /// Spawn the port loops and watchdog for a freshly opened port.
    pub(crate) fn start(
        port: Box<dyn SerialLink>,
        config: &SerialConfig,
        events: EventBus,
    ) -> Result<Self> {
        let reader_port = port.try_clone_link()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dead_tx, dead_rx) = watch::channel(false);
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (ping_tx, ping_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let idle_pause = config.read_poll();
        let reader_shutdown = shutdown_rx.clone();
        let reader = tokio::task::spawn_blocking(move || {
            read_loop(reader_port, response_tx, ping_tx, reader_shutdown, idle_pause)
        });
        let writer = tokio::task::spawn_blocking(move || write_loop(port, write_rx));

        let watchdog_task = tokio::spawn(watchdog(
            config.response_timeout(),
            command_rx,
            ping_rx,
            dead_tx,
            events,
            shutdown_rx,
        ));

        Ok(Self {
            writes: Some(write_tx),
            responses: response_rx,
            watchdog: command_tx,
            dead: dead_rx,
            shutdown: shutdown_tx,
            response_timeout: config.response_timeout(),
            owed: 0,
            reader: Some(reader),
            writer: Some(writer),
            watchdog_task: Some(watchdog_task),
        })
    }

    /// True once the watchdog has declared the board silent.
    pub(crate) fn is_dead(&self) -> bool {
        *self.dead.borrow()
    }

    /// Write one frame and wait for the matching response line.
    ///
    /// The caller must hold the transport's single-flight lock.
    pub(crate) async fn exchange(&mut self, frame: &str, ctx: &Context) -> Result<String> {
        if self.is_dead() {
            return Err(BoardError::Timeout(self.response_timeout));
        }
        self.drain_stale()?;

        let _armed = Armed::new(self.watchdog.clone());
        self.transact(frame, ctx).await
    }

    /// Drop answers that arrived since the last exchange. A read failure
    /// since then belongs to this caller.
    fn drain_stale(&mut self) -> Result<()> {
        while let Ok(stale) = self.responses.try_recv() {
            let line = stale?;
            self.owed = self.owed.saturating_sub(1);
            log::debug!("discarding stale response: {}", line);
        }
        Ok(())
    }

    async fn transact(&mut self, frame: &str, ctx: &Context) -> Result<String> {
        let timeout = self.response_timeout;
        let (done_tx, done_rx) = oneshot::channel();
        let request = WriteRequest {
            frame: frame.as_bytes().to_vec(),
            done: done_tx,
        };
        let queued = self
            .writes
            .as_ref()
            .is_some_and(|writes| writes.send(request).is_ok());
        if !queued {
            return Err(writer_stopped().into());
        }
        // Counted before the write completes: an exchange abandoned from
        // here on still leaves its answer on the wire.
        self.owed += 1;

        let written = tokio::select! {
            biased;
            written = done_rx => written.unwrap_or_else(|_| Err(writer_stopped())),
            _ = wait_dead(&mut self.dead) => return Err(BoardError::Timeout(timeout)),
            err = ctx.done() => return Err(err),
        };
        if let Err(e) = written {
            self.owed -= 1;
            return Err(e.into());
        }

        loop {
            let response = tokio::select! {
                biased;
                // A closed channel means the read loop is gone; keep waiting
                // so the watchdog can declare the link dead.
                Some(response) = self.responses.recv() => response?,
                _ = wait_dead(&mut self.dead) => return Err(BoardError::Timeout(timeout)),
                err = ctx.done() => return Err(err),
            };
            self.owed = self.owed.saturating_sub(1);
            if self.owed == 0 {
                return Ok(response);
            }
            log::debug!("discarding late response: {}", response);
        }
    }

    /// Stop the workers and wait until they have released the port.
    pub(crate) async fn close(mut self) {
        self.shutdown.send_replace(true);
        self.writes = None;
        for task in [self.reader.take(), self.writer.take()].into_iter().flatten() {
            if let Err(e) = task.await {
                log::warn!("serial port loop ended abnormally: {}", e);
            }
        }
        if let Some(watchdog) = self.watchdog_task.take() {
            let _ = watchdog.await;
        }
    }
}

/// Keeps the watchdog armed for the life of one exchange, including one
/// whose future is dropped halfway.
struct Armed(mpsc::UnboundedSender<WatchdogCommand>);

impl Armed {
    fn new(watchdog: mpsc::UnboundedSender<WatchdogCommand>) -> Self {
        let _ = watchdog.send(WatchdogCommand::Arm);
        Self(watchdog)
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        let _ = self.0.send(WatchdogCommand::Disarm);
    }
}

fn writer_stopped() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "serial write loop stopped")
}

async fn wait_dead(dead: &mut watch::Receiver<bool>) {
    // A dropped sender means the watchdog is gone, which is just as fatal.
    let _ = dead.wait_for(|dead| *dead).await;
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ============================================================================
// Port loops
// ============================================================================

/// Blocking write loop. Owns the write half of the port and runs until the
/// link drops its sender.
fn write_loop(mut port: Box<dyn SerialLink>, mut requests: mpsc::UnboundedReceiver<WriteRequest>) {
    while let Some(request) = requests.blocking_recv() {
        let result = port.write_all(&request.frame).and_then(|_| port.flush());
        if let Err(e) = &result {
            log::error!("serial write failed: {}", e);
        }
        let _ = request.done.send(result);
    }
    log::debug!("serial write loop stopped");
}

/// Blocking read loop. Runs until shutdown, a read error, or nobody is
/// listening for responses any more.
///
/// Every non-empty read pings the watchdog. A line feed in the accumulated
/// bytes completes a response. A read that returns nothing, whether as
/// `Ok(0)` or as a read timeout, completes whatever has been accumulated.
fn read_loop(
    mut port: Box<dyn SerialLink>,
    responses: mpsc::UnboundedSender<Response>,
    pings: mpsc::UnboundedSender<()>,
    shutdown: watch::Receiver<bool>,
    idle_pause: Duration,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if *shutdown.borrow() || shutdown.has_changed().is_err() {
            break;
        }

        // `waited` is true when the port itself already blocked for its
        // read timeout.
        let (n, waited) = match port.read(&mut chunk) {
            Ok(n) => (n, false),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => (0, true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => (0, false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("serial read failed: {}", e);
                let _ = responses.send(Err(e));
                break;
            }
        };

        if n == 0 {
            if pending.is_empty() {
                if !waited {
                    std::thread::sleep(idle_pause);
                }
                continue;
            }
            let text = String::from_utf8_lossy(&pending).trim().to_string();
            pending.clear();
            if !text.is_empty() && responses.send(Ok(text)).is_err() {
                break;
            }
            continue;
        }

        pending.extend_from_slice(&chunk[..n]);
        let _ = pings.send(());

        while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if text.is_empty() {
                continue;
            }
            if responses.send(Ok(text)).is_err() {
                return;
            }
        }
    }
    log::debug!("serial read loop stopped");
}

// ============================================================================
// Watchdog
// ============================================================================

/// Silence detector.
///
/// Idle until armed. While armed, every ping from the read loop (and every
/// re-arm) pushes the deadline out by `timeout`. If the deadline passes, the
/// link is marked dead, a [`BoardEvent::Timeout`] is published, and the
/// watchdog exits for good.
async fn watchdog(
    timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<WatchdogCommand>,
    mut pings: mpsc::UnboundedReceiver<()>,
    dead: watch::Sender<bool>,
    events: EventBus,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pings_open = true;

    'idle: loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            command = commands.recv() => match command {
                Some(WatchdogCommand::Arm) => {}
                Some(WatchdogCommand::Disarm) => continue 'idle,
                None => return,
            },
            // Pings outside an exchange carry no information.
            ping = pings.recv(), if pings_open => {
                pings_open = ping.is_some();
                continue 'idle;
            }
        }

        let timer = tokio::time::sleep(timeout);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = &mut timer => {
                    log::warn!("no data from board for {:?}, declaring link dead", timeout);
                    dead.send_replace(true);
                    events.publish(BoardEvent::Timeout);
                    return;
                }
                command = commands.recv() => match command {
                    Some(WatchdogCommand::Arm) => timer.as_mut().reset(Instant::now() + timeout),
                    Some(WatchdogCommand::Disarm) => continue 'idle,
                    None => return,
                },
                ping = pings.recv(), if pings_open => match ping {
                    Some(()) => timer.as_mut().reset(Instant::now() + timeout),
                    None => pings_open = false,
                },
            }
        }
    }
}

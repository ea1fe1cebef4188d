//! Link session management
//!
//! Owns the single serial line, the direction state and the pending
//! telemetry slot, and runs the watchdog timers that bound every
//! device-facing call.
//!
//! All process-wide state lives behind one session object. Locks are short
//! and never held across an await point, except the dedicated writer mutex
//! that serializes byte transmission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{split, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::commands::{Command, Direction, DriveMode, DriveOutcome};
use super::frame::{FrameAccumulator, TelemetryFrame};
use super::line::{LineIo, LineOpener, SerialLineOpener};
use super::reply::ReplyCell;
use super::{LinkError, DISCONNECTION_TIMEOUT_MS, WARMUP_DELAY_MS};

/// Connection lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// No line has been selected
    NoLine,
    /// A line is selected but not open
    Selected,
    /// The line is open
    Open,
}

type LineWriter = WriteHalf<Box<dyn LineIo>>;
type SharedWriter = Arc<tokio::sync::Mutex<LineWriter>>;
type TelemetryCell = ReplyCell<Result<TelemetryFrame, LinkError>>;

/// Last selected direction plus the armed flag.
///
/// Armed means the next confirm dispatch may fire without an explicit
/// direction argument. Independent of line selection.
#[derive(Debug, Default)]
struct DriveState {
    direction: Option<Direction>,
    armed: bool,
    // Telemetry is pulled by re-asserting the current command; starts as
    // the stop byte before anything has been dispatched.
    last_byte: u8,
}

/// The currently selected line and, when open, its halves
struct LineSlot {
    name: String,
    writer: Option<SharedWriter>,
    reader: Option<JoinHandle<()>>,
}

struct Inner {
    opener: Box<dyn LineOpener>,
    line: Mutex<Option<LineSlot>>,
    pending: Mutex<Option<TelemetryCell>>,
    accumulator: Mutex<FrameAccumulator>,
    drive: Mutex<DriveState>,
    // Bumped on every open/close/reselect; events carrying an older epoch
    // belong to a dead line instance and are discarded.
    epoch: AtomicU64,
}

// Poisoned locks are recovered, not propagated: state stays usable after a
// panicking test thread.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serial control session for one rover.
///
/// Exactly one line, one pending telemetry slot and one direction state,
/// process-wide. Cloning shares the session.
#[derive(Clone)]
pub struct RoverLink {
    inner: Arc<Inner>,
}

impl RoverLink {
    /// Create a session that opens real serial ports
    pub fn new() -> Self {
        Self::with_opener(Box::new(SerialLineOpener::new()))
    }

    /// Create a session with a custom line opener (tests use an in-memory
    /// line)
    pub fn with_opener(opener: Box<dyn LineOpener>) -> Self {
        Self {
            inner: Arc::new(Inner {
                opener,
                line: Mutex::new(None),
                pending: Mutex::new(None),
                accumulator: Mutex::new(FrameAccumulator::new()),
                drive: Mutex::new(DriveState::default()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Select the serial line to use.
    ///
    /// Any previously open connection is destroyed outright: its close is
    /// best-effort and a failure is logged, never surfaced, since
    /// reselection must proceed regardless. Direction state is left alone.
    pub fn select_line(&self, name: &str) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let mut line = lock(&self.inner.line);
        if let Some(old) = line.take() {
            abandon_connection(old);
        }
        *line = Some(LineSlot {
            name: name.to_string(),
            writer: None,
            reader: None,
        });
        debug!(line = %name, "serial line selected");
    }

    /// Name of the currently selected line, if any
    pub fn line_name(&self) -> Option<String> {
        lock(&self.inner.line).as_ref().map(|slot| slot.name.clone())
    }

    /// Current connection state
    pub fn state(&self) -> LinkState {
        match &*lock(&self.inner.line) {
            None => LinkState::NoLine,
            Some(slot) if slot.writer.is_some() => LinkState::Open,
            Some(_) => LinkState::Selected,
        }
    }

    /// Whether the selected line is open
    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    /// Open the selected line.
    ///
    /// Idempotent while open. After the hardware open succeeds the call
    /// replies only once the warm-up delay has passed; a watchdog fails the
    /// same call with [`LinkError::NotResponding`] if that reply has not
    /// been delivered in time. Exactly one of the two outcomes wins.
    pub async fn open(&self) -> Result<(), LinkError> {
        let name = {
            let line = lock(&self.inner.line);
            match &*line {
                None => return Err(LinkError::NoLineSelected),
                Some(slot) if slot.writer.is_some() => {
                    debug!(line = %slot.name, "line already open");
                    return Ok(());
                }
                Some(slot) => slot.name.clone(),
            }
        };

        let (cell, rx) = ReplyCell::new();

        let watchdog = cell.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(DISCONNECTION_TIMEOUT_MS)).await;
            if watchdog.complete(Err(LinkError::NotResponding)) {
                warn!("serial line did not respond to open");
            }
        });

        match self.inner.opener.open(&name) {
            Err(e) => {
                warn!(line = %name, error = %e, "open failed");
                cell.complete(Err(LinkError::OpenFailed(e.to_string())));
            }
            Ok(io) => {
                let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                let (read_half, write_half) = split(io);
                let writer = Arc::new(tokio::sync::Mutex::new(write_half));
                let mut reader = Some(tokio::spawn(read_loop(self.inner.clone(), read_half, epoch)));

                let installed = {
                    let mut line = lock(&self.inner.line);
                    // Reselected while opening: this connection is stale
                    // before it ever carried a byte.
                    let current = self.inner.epoch.load(Ordering::SeqCst) == epoch;
                    match line.as_mut() {
                        Some(slot) if current => {
                            slot.writer = Some(Arc::clone(&writer));
                            slot.reader = reader.take();
                            true
                        }
                        _ => false,
                    }
                };

                if installed {
                    info!(line = %name, "serial line open, warming up");
                    let warmup = cell.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(WARMUP_DELAY_MS)).await;
                        if warmup.complete(Ok(())) {
                            debug!("warm-up complete");
                        }
                    });
                } else {
                    warn!(line = %name, "line reselected while opening; dropping connection");
                    if let Some(handle) = reader.take() {
                        handle.abort();
                    }
                    cell.complete(Err(LinkError::OpenFailed(
                        "line was reselected while opening".to_string(),
                    )));
                }
            }
        }

        rx.await.unwrap_or(Err(LinkError::NotResponding))
    }

    /// Close the open line.
    ///
    /// The receive buffer is reset whatever the hardware close reports.
    pub async fn close(&self) -> Result<(), LinkError> {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let (writer, reader, name) = {
            let mut line = lock(&self.inner.line);
            let slot = line.as_mut().ok_or(LinkError::NoLineSelected)?;
            let writer = slot.writer.take().ok_or(LinkError::NotOpen)?;
            (writer, slot.reader.take(), slot.name.clone())
        };

        if let Some(handle) = reader {
            handle.abort();
        }
        let result = {
            let mut writer = writer.lock().await;
            writer.shutdown().await
        };
        lock(&self.inner.accumulator).reset();

        match result {
            Ok(()) => {
                info!(line = %name, "serial line closed");
                Ok(())
            }
            Err(e) => {
                warn!(line = %name, error = %e, "line closed with error");
                Err(LinkError::CloseFailed(e.to_string()))
            }
        }
    }

    /// Select a direction for the next confirm dispatch.
    ///
    /// With the engine armed, the dispatch fires immediately and its outcome
    /// supersedes this call's own reply.
    pub async fn set_direction(&self, code: &str) -> Result<DriveOutcome, LinkError> {
        let direction = Direction::from_code(code)
            .ok_or_else(|| LinkError::InvalidDirection(code.to_string()))?;

        let armed = {
            let mut drive = lock(&self.inner.drive);
            drive.direction = Some(direction);
            drive.armed
        };

        if armed {
            self.drive(DriveMode::Confirm.code()).await
        } else {
            debug!(?direction, "direction stored");
            Ok(DriveOutcome::Stored(direction))
        }
    }

    /// Dispatch an engine command by mode code.
    ///
    /// `"0"` always transmits the stop byte. `"5"` transmits the saved
    /// direction; with none saved it transmits nothing, arms the engine and
    /// replies [`DriveOutcome::DirectionPending`]. The watchdog is armed
    /// before anything else so the caller's wait is bounded even if the
    /// write stalls.
    pub async fn drive(&self, mode_code: &str) -> Result<DriveOutcome, LinkError> {
        let (cell, rx) = ReplyCell::new();
        self.watch_disconnection(&cell);
        self.start_drive(mode_code, &cell);
        rx.await.unwrap_or(Err(LinkError::Disconnected))
    }

    /// Pull one telemetry frame from the device.
    ///
    /// Occupies the single pending slot, silently superseding any previous
    /// occupant (which only ever observes its own watchdog), and re-asserts
    /// the last-sent command byte to solicit the frame.
    pub async fn telemetry(&self) -> Result<TelemetryFrame, LinkError> {
        let writer = self.check_available()?;

        let (cell, rx) = ReplyCell::new();
        self.watch_disconnection(&cell);

        {
            let mut pending = lock(&self.inner.pending);
            if pending.replace(cell).is_some() {
                debug!("pending telemetry call superseded");
            }
        }

        let last_byte = lock(&self.inner.drive).last_byte;
        tokio::spawn(async move {
            let mut writer = writer.lock().await;
            // Write failures are not surfaced here: the pending caller is
            // resolved by the next frame or by its watchdog.
            if let Err(e) = writer.write_all(&[last_byte]).await {
                warn!(error = %e, "telemetry poll write failed");
            }
        });

        rx.await.unwrap_or(Err(LinkError::Disconnected))
    }

    /// Line availability gate shared by command and telemetry calls
    fn check_available(&self) -> Result<SharedWriter, LinkError> {
        let line = lock(&self.inner.line);
        let slot = line.as_ref().ok_or(LinkError::NoLineSelected)?;
        slot.writer.clone().ok_or(LinkError::NotOpen)
    }

    /// Arm the disconnection watchdog for one call. If it wins the race it
    /// also closes the connection, leaving later calls to fail fast.
    fn watch_disconnection<T: Send + 'static>(&self, cell: &ReplyCell<Result<T, LinkError>>) {
        let cell = cell.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(DISCONNECTION_TIMEOUT_MS)).await;
            if cell.complete(Err(LinkError::Disconnected)) {
                warn!("watchdog fired: device did not respond");
                inner.drop_connection("watchdog timeout");
            }
        });
    }

    fn start_drive(&self, mode_code: &str, cell: &ReplyCell<Result<DriveOutcome, LinkError>>) {
        let writer = match self.check_available() {
            Ok(writer) => writer,
            Err(e) => {
                cell.complete(Err(e));
                return;
            }
        };

        let mode = match DriveMode::from_code(mode_code) {
            Some(mode) => mode,
            None => {
                cell.complete(Err(LinkError::InvalidMode(mode_code.to_string())));
                return;
            }
        };

        let command = {
            let mut drive = lock(&self.inner.drive);
            match mode {
                DriveMode::Stop => Command::Stop,
                DriveMode::Confirm => match drive.direction {
                    Some(direction) => direction.command(),
                    None => {
                        drive.armed = true;
                        debug!("confirm with no direction saved; engine armed");
                        cell.complete(Ok(DriveOutcome::DirectionPending));
                        return;
                    }
                },
            }
        };

        self.transmit(command, cell.clone(), writer);
    }

    /// Write one command byte on a spawned task and complete the call with
    /// the write outcome, unless the watchdog got there first.
    fn transmit(
        &self,
        command: Command,
        cell: ReplyCell<Result<DriveOutcome, LinkError>>,
        writer: SharedWriter,
    ) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let byte = command.wire_byte();
            let result = {
                let mut writer = writer.lock().await;
                match writer.write_all(&[byte]).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                }
            };
            match result {
                Ok(()) => {
                    {
                        let mut drive = lock(&inner.drive);
                        drive.armed = false;
                        drive.last_byte = byte;
                    }
                    debug!(?command, byte, "command transmitted");
                    cell.complete(Ok(DriveOutcome::Dispatched(command)));
                }
                Err(e) => {
                    warn!(?command, error = %e, "command write failed");
                    cell.complete(Err(LinkError::WriteFailed(e.to_string())));
                }
            }
        });
    }
}

impl Default for RoverLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Feed raw bytes from the line into the reassembler.
    ///
    /// With nobody waiting the buffer is reset on the spot; partial or stale
    /// data must not leak into a later exchange. With a caller pending, the
    /// first full frame candidate resolves it and clears the slot, and the
    /// buffer is reset whatever the decode said.
    fn ingest(&self, epoch: u64, bytes: &[u8]) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(len = bytes.len(), "discarding bytes from a stale line instance");
            return;
        }

        let mut accumulator = lock(&self.accumulator);
        accumulator.extend(bytes);

        let mut pending = lock(&self.pending);
        let Some(cell) = pending.as_ref() else {
            accumulator.reset();
            return;
        };

        let Some(frame) = accumulator.take_frame() else {
            return;
        };
        let result = TelemetryFrame::decode(&frame);
        if let Err(e) = &result {
            warn!(error = %e, "telemetry frame rejected");
        }
        cell.complete(result);
        *pending = None;
    }

    /// Drop the open connection, if any. Pending callers are left to their
    /// own watchdogs.
    fn drop_connection(&self, reason: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        {
            let mut line = lock(&self.line);
            if let Some(slot) = line.as_mut() {
                if slot.writer.is_some() {
                    warn!(line = %slot.name, reason, "dropping serial connection");
                }
                let old = LineSlot {
                    name: slot.name.clone(),
                    writer: slot.writer.take(),
                    reader: slot.reader.take(),
                };
                abandon_connection(old);
            }
        }
        lock(&self.accumulator).reset();
    }
}

/// Best-effort teardown of a line slot's connection; failures are logged only
fn abandon_connection(slot: LineSlot) {
    if let Some(handle) = slot.reader {
        handle.abort();
    }
    if let Some(writer) = slot.writer {
        let name = slot.name;
        tokio::spawn(async move {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                warn!(line = %name, error = %e, "close of abandoned connection failed");
            } else {
                debug!(line = %name, "previous connection closed");
            }
        });
    }
}

/// Pump bytes from the line into the session until the line dies or the
/// connection is torn down under us.
async fn read_loop(inner: Arc<Inner>, mut reader: ReadHalf<Box<dyn LineIo>>, epoch: u64) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("serial line reached end of stream");
                break;
            }
            Ok(n) => inner.ingest(epoch, &buf[..n]),
            Err(e) => {
                warn!(error = %e, "serial line read error");
                break;
            }
        }
    }
    // A dead line means the link is no longer open; flip the state unless a
    // newer connection already took over.
    if inner.epoch.load(Ordering::SeqCst) == epoch {
        inner.drop_connection("line error");
    }
}

//! Grbl connection
//!
//! Owns the transport and runs one reader task per session. Line commands
//! go through a single-flight slot: at most one command (or one program
//! stream) has acknowledgments outstanding, and the reader hands every
//! `ok`/`error:N` to whoever holds the slot. Everything else is published
//! to push-message subscribers. Real-time bytes bypass the slot entirely.

use crate::communication::{open_transport, BoxedTransport, ConnectionParams};
use crate::firmware::grbl::compile_options::CompileTimeOptions;
use crate::firmware::grbl::gcode_params::{Coordinates, GcodeParameters};
use crate::firmware::grbl::gcode_state::GcodeState;
use crate::firmware::grbl::message::{Message, ResponseMessage};
use crate::firmware::grbl::push::PushMessage;
use crate::firmware::grbl::realtime::{split_realtime, RealTimeCommand};
use crate::firmware::grbl::status_report::{AccessoryState, MachineState, Overrides, StatusReport};
use crate::firmware::grbl::streamer::{AckLink, ProgramStreamer, StreamSummary};
use async_trait::async_trait;
use grblkit_core::{
    Broker, BrokerConfig, ConnectionError, ControllerError, Error, GcodeError, Result,
    SubscriptionId,
};
use grblkit_gcode::Parser;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Connection tuning
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Controller receive buffer size, used until `[OPT:]` reports the real one
    pub rx_buffer_size: usize,
    /// Period of automatic `?` status queries, `None` to disable
    pub status_poll_interval: Option<Duration>,
    /// Slots in each push-message subscriber channel
    pub push_channel_capacity: usize,
    /// Timeout used by [`GrblConnection::execute`]
    pub command_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: 128,
            status_poll_interval: None,
            push_channel_capacity: 64,
            command_timeout: Duration::from_secs(5),
        }
    }
}

/// Last known controller state, built from push messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrblControllerState {
    /// Last status report
    pub status: Option<StatusReport>,
    /// Last reported `WCO`
    pub work_coordinate_offset: Option<Coordinates>,
    /// Last reported `Ov`
    pub overrides: Option<Overrides>,
    pub accessories: AccessoryState,
    pub gcode_parameters: GcodeParameters,
    /// Last `[GC:]` report
    pub gcode_state: Option<GcodeState>,
    /// Firmware version from the welcome banner or `[VER:]`
    pub version: Option<String>,
    pub compile_options: Option<CompileTimeOptions>,
    /// Active alarm code
    pub alarm: Option<u16>,
}

impl GrblControllerState {
    /// Merge a push message into the state
    pub fn apply(&mut self, message: &PushMessage) {
        match message {
            PushMessage::Welcome { version, .. } => {
                let compile_options = self.compile_options.take();
                *self = Self {
                    version: Some(version.clone()),
                    compile_options,
                    ..Self::default()
                };
            }
            PushMessage::Alarm { code, .. } => self.alarm = Some(*code),
            PushMessage::GcodeState { state, .. } => self.gcode_state = Some(state.clone()),
            PushMessage::GcodeParam { param, .. } => self.gcode_parameters.update(param),
            PushMessage::Version { version, .. } => self.version = Some(version.clone()),
            PushMessage::CompileTimeOptions { options, .. } => {
                self.compile_options = Some(options.clone())
            }
            PushMessage::StatusReport { report, .. } => {
                if let Some(wco) = report.work_coordinate_offset {
                    self.work_coordinate_offset = Some(wco);
                }
                // Accessories are only reported alongside overrides; `Ov`
                // without `A` means everything is off.
                if let Some(overrides) = report.overrides {
                    self.overrides = Some(overrides);
                    self.accessories = report.accessories.unwrap_or_default();
                } else if let Some(accessories) = report.accessories {
                    self.accessories = accessories;
                }
                if report.state != MachineState::Alarm {
                    self.alarm = None;
                }
                self.status = Some(report.clone());
            }
            PushMessage::Setting { .. }
            | PushMessage::Feedback { .. }
            | PushMessage::Help { .. }
            | PushMessage::StartupLineExecution { .. }
            | PushMessage::Echo { .. }
            | PushMessage::Empty
            | PushMessage::Unknown { .. } => {}
        }
    }

    /// Machine position, derived from `WPos + WCO` when only `WPos` is reported
    pub fn machine_position(&self) -> Option<Coordinates> {
        let status = self.status.as_ref()?;
        status.machine_position.or_else(|| {
            let wpos = status.work_position?;
            Some(wpos.plus(&self.work_coordinate_offset?))
        })
    }

    /// Work position, derived from `MPos - WCO` when only `MPos` is reported
    pub fn work_position(&self) -> Option<Coordinates> {
        let status = self.status.as_ref()?;
        status.work_position.or_else(|| {
            let mpos = status.machine_position?;
            Some(mpos.minus(&self.work_coordinate_offset?))
        })
    }
}

/// State shared by the session tasks and the callers
struct Shared {
    writer: tokio::sync::Mutex<WriteHalf<BoxedTransport>>,
    /// Single-flight slot: receives every acknowledgment while held
    pending: Mutex<Option<mpsc::UnboundedSender<ResponseMessage>>>,
    broker: Broker<PushMessage>,
    alive: AtomicBool,
    desynchronized: AtomicBool,
}

impl Shared {
    async fn write_all(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.map_err(lost)?;
        writer.flush().await.map_err(lost)?;
        Ok(())
    }

    fn deliver(&self, response: ResponseMessage) {
        if let Some(tx) = self.pending.lock().as_ref() {
            if tx.send(response).is_ok() {
                return;
            }
        }
        tracing::warn!("Discarding unsolicited response {}", response);
    }

    /// Error for a slot whose sender went away
    fn slot_closed_error(&self) -> Error {
        if self.alive.load(Ordering::SeqCst) {
            ControllerError::CommandAborted.into()
        } else {
            ConnectionError::ConnectionLost {
                reason: "connection closed while waiting for a response".to_string(),
            }
            .into()
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(ConnectionError::ConnectionLost {
                reason: "reader stopped".to_string(),
            }
            .into());
        }
        if self.desynchronized.load(Ordering::SeqCst) {
            return Err(ControllerError::Desynchronized.into());
        }
        Ok(())
    }
}

fn lost(e: std::io::Error) -> Error {
    ConnectionError::ConnectionLost {
        reason: e.to_string(),
    }
    .into()
}

/// Holds the single-flight slot for one command or stream
///
/// Dropping it while armed marks the connection desynchronized: the
/// controller may still answer a line the host no longer waits for.
struct InFlight {
    shared: Arc<Shared>,
    armed: bool,
}

impl InFlight {
    fn install(shared: &Arc<Shared>) -> (Self, mpsc::UnboundedReceiver<ResponseMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        *shared.pending.lock() = Some(tx);
        (
            Self {
                shared: shared.clone(),
                armed: true,
            },
            rx,
        )
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.shared.pending.lock().take();
        if self.armed {
            tracing::warn!("Command interrupted with acknowledgments outstanding; connection desynchronized");
            self.shared.desynchronized.store(true, Ordering::SeqCst);
        }
    }
}

struct Session {
    shared: Arc<Shared>,
    command_lock: Arc<tokio::sync::Mutex<()>>,
    reader_task: JoinHandle<()>,
    poll_task: Option<JoinHandle<()>>,
}

impl Session {
    async fn shutdown(&self) {
        self.reader_task.abort();
        if let Some(task) = &self.poll_task {
            task.abort();
        }
        self.shared.alive.store(false, Ordering::SeqCst);
        self.shared.pending.lock().take();
        self.shared.broker.close();
        if let Err(e) = self.shared.writer.lock().await.shutdown().await {
            tracing::debug!("Transport shutdown failed: {}", e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(task) = &self.poll_task {
            task.abort();
        }
    }
}

/// Acknowledgment link over a live session
struct SessionLink {
    shared: Arc<Shared>,
    acknowledgments: mpsc::UnboundedReceiver<ResponseMessage>,
}

#[async_trait]
impl AckLink for SessionLink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.shared.write_all(chunk).await
    }

    async fn next_acknowledgment(&mut self) -> Result<ResponseMessage> {
        match self.acknowledgments.recv().await {
            Some(response) => Ok(response),
            None => Err(self.shared.slot_closed_error()),
        }
    }
}

/// A connection to a Grbl controller
pub struct GrblConnection {
    params: ConnectionParams,
    config: ConnectionConfig,
    state: Arc<RwLock<GrblControllerState>>,
    session: RwLock<Option<Arc<Session>>>,
}

impl GrblConnection {
    pub fn new(params: ConnectionParams, config: ConnectionConfig) -> Self {
        Self {
            params,
            config,
            state: Arc::new(RwLock::new(GrblControllerState::default())),
            session: RwLock::new(None),
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the configured transport and start a session
    ///
    /// Returns the push-message channel. It ends when the session ends.
    pub async fn connect(&self) -> Result<mpsc::Receiver<PushMessage>> {
        if self.is_connected() {
            return Err(ControllerError::AlreadyConnected.into());
        }
        tracing::info!("Connecting to {}", self.params.endpoint());
        let transport = open_transport(&self.params).await?;
        self.connect_with(transport).await
    }

    /// Start a session over an already open transport
    pub async fn connect_with(&self, transport: BoxedTransport) -> Result<mpsc::Receiver<PushMessage>> {
        let (previous, receiver) = {
            let mut session = self.session.write();
            if session
                .as_ref()
                .is_some_and(|s| s.shared.alive.load(Ordering::SeqCst))
            {
                return Err(ControllerError::AlreadyConnected.into());
            }

            let (read_half, write_half) = tokio::io::split(transport);
            let shared = Arc::new(Shared {
                writer: tokio::sync::Mutex::new(write_half),
                pending: Mutex::new(None),
                broker: Broker::with_config(BrokerConfig {
                    default_capacity: self.config.push_channel_capacity,
                }),
                alive: AtomicBool::new(true),
                desynchronized: AtomicBool::new(false),
            });
            let (_, receiver) = shared
                .broker
                .subscribe("connection", self.config.push_channel_capacity);

            *self.state.write() = GrblControllerState::default();
            let reader_task = tokio::spawn(read_loop(read_half, shared.clone(), self.state.clone()));
            let poll_task = self
                .config
                .status_poll_interval
                .map(|interval| tokio::spawn(poll_status(shared.clone(), interval)));

            let previous = session.replace(Arc::new(Session {
                shared,
                command_lock: Arc::new(tokio::sync::Mutex::new(())),
                reader_task,
                poll_task,
            }));
            (previous, receiver)
        };

        if let Some(old) = previous {
            old.shutdown().await;
        }
        tracing::debug!("Session started");
        Ok(receiver)
    }

    /// Close the transport and end every push-message channel
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.session.write().take();
        match session {
            Some(session) => {
                session.shutdown().await;
                tracing::info!("Disconnected from {}", self.params.endpoint());
            }
            None => tracing::debug!("Disconnect requested while not connected"),
        }
        Ok(())
    }

    fn session(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .clone()
            .ok_or_else(|| ControllerError::NotConnected.into())
    }

    /// True while a session exists and its reader is running
    pub fn is_connected(&self) -> bool {
        self.session
            .read()
            .as_ref()
            .is_some_and(|s| s.shared.alive.load(Ordering::SeqCst))
    }

    /// True after a timed out or interrupted command, until the controller resets
    pub fn is_desynchronized(&self) -> bool {
        self.session
            .read()
            .as_ref()
            .is_some_and(|s| s.shared.desynchronized.load(Ordering::SeqCst))
    }

    /// Add a push-message subscriber to the current session
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        capacity: usize,
    ) -> Result<(SubscriptionId, mpsc::Receiver<PushMessage>)> {
        Ok(self.session()?.shared.broker.subscribe(name, capacity))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.session()?.shared.broker.unsubscribe(id);
        Ok(())
    }

    /// Send one line command and wait for its acknowledgment
    ///
    /// The line is parsed and sent in compact form. `error:N` is returned as
    /// a response, not as an error. On timeout the connection becomes
    /// desynchronized and refuses further line commands until the
    /// controller resets or the connection is re-established.
    pub async fn send_command(&self, line: &str, timeout: Duration) -> Result<ResponseMessage> {
        let wire = command_line(line)?;
        let session = self.session()?;
        let _slot = session.command_lock.clone().lock_owned().await;
        session.shared.ensure_usable()?;

        let (mut flight, mut acknowledgments) = InFlight::install(&session.shared);
        tracing::debug!(">> {}", wire.trim_end());
        session.shared.write_all(wire.as_bytes()).await?;

        match tokio::time::timeout(timeout, acknowledgments.recv()).await {
            Ok(Some(response)) => {
                flight.disarm();
                Ok(response)
            }
            Ok(None) => {
                flight.disarm();
                Err(session.shared.slot_closed_error())
            }
            Err(_) => {
                tracing::warn!("No response to {:?} within {:?}", wire.trim_end(), timeout);
                Err(ControllerError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    /// Write a real-time command immediately
    pub async fn send_realtime(&self, command: RealTimeCommand) -> Result<()> {
        let session = self.session()?;
        tracing::debug!(">> {}", command);
        session.shared.write_all(&[command.byte()]).await
    }

    /// Run user input that may mix real-time bytes and a line command
    ///
    /// Real-time bytes are sent first, in order. The remaining text, if
    /// any, is sent as a line command with the configured timeout.
    pub async fn execute(&self, input: impl AsRef<[u8]>) -> Result<Option<ResponseMessage>> {
        let (commands, rest) = split_realtime(input.as_ref());
        for command in commands {
            self.send_realtime(command).await?;
        }

        let text = String::from_utf8(rest).map_err(|e| GcodeError::InvalidSyntax {
            line_number: 1,
            reason: format!("invalid UTF-8 text: {}", e),
        })?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        self.send_command(text, self.config.command_timeout)
            .await
            .map(Some)
    }

    /// Stream a program with character-counting flow control
    ///
    /// Holds the single-flight slot for the whole stream. The receive
    /// buffer size comes from the controller's `[OPT:]` report when one has
    /// been seen. A stream that fails or is cancelled with lines still in
    /// flight leaves the connection desynchronized.
    pub async fn stream_program<R, F>(&self, program: R, cancel: F) -> Result<StreamSummary>
    where
        R: BufRead,
        F: Future<Output = ()>,
    {
        let session = self.session()?;
        let _slot = session.command_lock.clone().lock_owned().await;
        session.shared.ensure_usable()?;

        let rx_buffer_size = self
            .state
            .read()
            .compile_options
            .as_ref()
            .map(|options| options.serial_rx_buffer_bytes as usize)
            .unwrap_or(self.config.rx_buffer_size);

        let (mut flight, acknowledgments) = InFlight::install(&session.shared);
        let link = SessionLink {
            shared: session.shared.clone(),
            acknowledgments,
        };
        let mut streamer = ProgramStreamer::new(link, rx_buffer_size);
        let result = streamer.run(program, cancel).await;

        let aborted = matches!(result, Err(Error::Controller(ControllerError::CommandAborted)));
        if streamer.is_balanced() || aborted {
            flight.disarm();
        }
        result
    }

    /// Snapshot of the whole controller state
    pub fn state(&self) -> GrblControllerState {
        self.state.read().clone()
    }

    pub fn status(&self) -> Option<StatusReport> {
        self.state.read().status.clone()
    }

    pub fn gcode_parameters(&self) -> GcodeParameters {
        self.state.read().gcode_parameters.clone()
    }

    pub fn gcode_state(&self) -> Option<GcodeState> {
        self.state.read().gcode_state.clone()
    }

    pub fn overrides(&self) -> Option<Overrides> {
        self.state.read().overrides
    }

    pub fn accessory_state(&self) -> AccessoryState {
        self.state.read().accessories
    }

    pub fn work_coordinate_offset(&self) -> Option<Coordinates> {
        self.state.read().work_coordinate_offset
    }

    pub fn version(&self) -> Option<String> {
        self.state.read().version.clone()
    }

    pub fn compile_options(&self) -> Option<CompileTimeOptions> {
        self.state.read().compile_options.clone()
    }

    pub fn machine_position(&self) -> Option<Coordinates> {
        self.state.read().machine_position()
    }

    pub fn work_position(&self) -> Option<Coordinates> {
        self.state.read().work_position()
    }
}

/// Parse a caller's line into exactly one wire line
fn command_line(line: &str) -> Result<String> {
    let mut parser = Parser::new(line.as_bytes());
    let block = parser.next_block()?.ok_or_else(|| GcodeError::InvalidSyntax {
        line_number: 1,
        reason: "empty command".to_string(),
    })?;
    if parser.next_block()?.is_some() {
        return Err(GcodeError::InvalidSyntax {
            line_number: parser.block_line_number(),
            reason: "a command must be a single line".to_string(),
        }
        .into());
    }
    Ok(format!("{}\n", block))
}

async fn read_loop(
    reader: ReadHalf<BoxedTransport>,
    shared: Arc<Shared>,
    state: Arc<RwLock<GrblControllerState>>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Controller closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!("Read from controller failed: {}", e);
                break;
            }
        };
        let line = line.strip_suffix('\r').unwrap_or(&line);
        tracing::trace!("<< {}", line);

        match Message::parse(line) {
            Ok(Message::Response(response)) => shared.deliver(response),
            Ok(Message::Push(push)) => {
                if let PushMessage::Welcome { version, .. } = &push {
                    tracing::info!("Controller reset (Grbl {})", version);
                    shared.desynchronized.store(false, Ordering::SeqCst);
                    shared.pending.lock().take();
                }
                if let PushMessage::Alarm { .. } = &push {
                    tracing::warn!("{}: {}", push.raw(), push.alarm().unwrap_or_default());
                }
                state.write().apply(&push);
                shared.broker.publish(push);
            }
            Err(e) => {
                tracing::error!("Protocol violation, closing session: {}", e);
                break;
            }
        }
    }

    shared.alive.store(false, Ordering::SeqCst);
    shared.pending.lock().take();
    shared.broker.close();
}

async fn poll_status(shared: Arc<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !shared.alive.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = shared
            .write_all(&[RealTimeCommand::StatusReportQuery.byte()])
            .await
        {
            tracing::warn!("Status poll stopped: {}", e);
            break;
        }
    }
}

//! Client connection to a chat server
//!
//! One spawned task owns the socket and the [`ConnectionMachine`]. Every
//! connect, read and write completion is handled there, one at a time.
//! [`ClientHandle::write`] and [`ClientHandle::close`] only post a
//! [`Command`] to that task, so they are safe to call from any thread.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wirechat_core::{MessageFrame, MessageKind, SessionConfig, HEADER_LENGTH};

use crate::error::{Error, Result};
use crate::machine::{Action, CloseReason, Command, ConnectionMachine, ConnectionState, Event};
use crate::transport::{connect_tcp, Transport};

/// Receives inbound frames, in the order the peer sent them
pub trait FrameSink: Send + 'static {
    fn deliver(&mut self, frame: MessageFrame);

    /// Called once when the connection ends
    fn closed(&mut self, _reason: &CloseReason) {}
}

/// Event forwarded by the channel sink
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Frame(MessageFrame),
    Closed(CloseReason),
}

impl FrameSink for mpsc::UnboundedSender<SinkEvent> {
    fn deliver(&mut self, frame: MessageFrame) {
        let _ = self.send(SinkEvent::Frame(frame));
    }

    fn closed(&mut self, reason: &CloseReason) {
        let _ = self.send(SinkEvent::Closed(reason.clone()));
    }
}

/// Cloneable handle for posting to a connection
#[derive(Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    session: Arc<SessionConfig>,
}

impl ClientHandle {
    /// Queue a frame for sending. Frames go out in the order they are posted.
    ///
    /// Frames still queued when the connection closes are dropped.
    pub fn write(&self, frame: MessageFrame) -> Result<()> {
        self.cmd_tx
            .send(Command::Write(frame))
            .map_err(|_| Error::NotConnected)
    }

    /// Queue a line as a `SendMessage` frame using the session's
    /// identifiers. Bytes past the body limit are truncated.
    pub fn send_line(&self, line: impl AsRef<[u8]>) -> Result<()> {
        let frame = MessageFrame::compose(
            MessageKind::SendMessage,
            self.session.sender_id,
            self.session.receiver_id,
            line.as_ref(),
        )?;
        self.write(frame)
    }

    /// Ask the connection to shut down. Closing twice is harmless.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

/// A running connection
pub struct Client {
    handle: ClientHandle,
    task: JoinHandle<()>,
}

impl Client {
    /// Start connecting over TCP to the first endpoint that accepts.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect<S: FrameSink>(
        endpoints: Vec<SocketAddr>,
        session: SessionConfig,
        sink: S,
    ) -> Result<Self> {
        info!(
            endpoints = endpoints.len(),
            name = %session.sender_name,
            sender_id = session.sender_id,
            receiver_id = session.receiver_id,
            "Connecting to server"
        );
        Self::connect_with(connect_tcp(endpoints), session, sink)
    }

    /// Start a connection over any transport produced by `connect`
    pub fn connect_with<C, T, S>(connect: C, session: SessionConfig, sink: S) -> Result<Self>
    where
        C: Future<Output = io::Result<T>> + Send + 'static,
        T: Transport,
        S: FrameSink,
    {
        let machine = ConnectionMachine::new(&session)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let driver = Driver {
            machine,
            sink,
            state_tx,
            reader: None,
            writer: None,
            read_op: None,
            write_op: None,
        };
        let task = tokio::spawn(connection_task(connect, driver, cmd_rx));

        Ok(Client {
            handle: ClientHandle {
                cmd_tx,
                state_rx,
                session: Arc::new(session),
            },
            task,
        })
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Wait for the connection task to finish
    pub async fn join(self) {
        let Client { handle, task } = self;
        // Our own sender would otherwise keep the task's command channel open
        drop(handle);
        if let Err(e) = task.await {
            warn!(error = %e, "Connection task failed");
        }
    }
}

type ReadOp<T> = Pin<Box<dyn Future<Output = (ReadHalf<T>, Event)> + Send>>;
type WriteOp<T> = Pin<Box<dyn Future<Output = (WriteHalf<T>, Event)> + Send>>;

/// Carries out machine actions against the socket halves.
///
/// A half is either idle in `reader`/`writer` or owned by its in-flight op.
struct Driver<T, S> {
    machine: ConnectionMachine,
    sink: S,
    state_tx: watch::Sender<ConnectionState>,
    reader: Option<ReadHalf<T>>,
    writer: Option<WriteHalf<T>>,
    read_op: Option<ReadOp<T>>,
    write_op: Option<WriteOp<T>>,
}

impl<T: Transport, S: FrameSink> Driver<T, S> {
    /// Feed one event to the machine. Returns `false` once closed.
    fn dispatch(&mut self, event: Event) -> bool {
        for action in self.machine.handle(event) {
            match action {
                Action::ReadHeader => match self.reader.take() {
                    Some(reader) => self.read_op = Some(read_header(reader)),
                    None => warn!("Header read requested while a read is in flight"),
                },
                Action::ReadBody(len) => match self.reader.take() {
                    Some(reader) => self.read_op = Some(read_body(reader, len)),
                    None => warn!("Body read requested while a read is in flight"),
                },
                Action::Write(bytes) => match self.writer.take() {
                    Some(writer) => self.write_op = Some(write_bytes(writer, bytes)),
                    None => warn!("Write requested while a write is in flight"),
                },
                Action::Deliver(frame) => {
                    debug!(
                        kind = ?frame.kind_code(),
                        len = frame.body_length(),
                        "Received frame"
                    );
                    self.sink.deliver(frame);
                }
                Action::Shutdown(reason) => {
                    // Dropping both halves closes the socket
                    self.read_op = None;
                    self.write_op = None;
                    self.reader = None;
                    self.writer = None;
                    self.sink.closed(&reason);
                }
            }
        }

        let state = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        state != ConnectionState::Closed
    }
}

/// Main connection task
async fn connection_task<C, T, S>(
    connect: C,
    mut driver: Driver<T, S>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) where
    C: Future<Output = io::Result<T>> + Send + 'static,
    T: Transport,
    S: FrameSink,
{
    tokio::pin!(connect);

    // Commands posted while connecting are queued, or end the attempt
    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(stream) => break stream,
                Err(e) => {
                    driver.dispatch(Event::ConnectFailed(e));
                    return;
                }
            },
            cmd = cmd_rx.recv() => {
                if !driver.dispatch(Event::Command(cmd.unwrap_or(Command::Close))) {
                    return;
                }
            }
        }
    };

    let (reader, writer) = tokio::io::split(stream);
    driver.reader = Some(reader);
    driver.writer = Some(writer);
    if !driver.dispatch(Event::Connected) {
        return;
    }

    loop {
        let event = tokio::select! {
            (reader, event) = next_completion(&mut driver.read_op) => {
                driver.read_op = None;
                driver.reader = Some(reader);
                event
            }
            (writer, event) = next_completion(&mut driver.write_op) => {
                driver.write_op = None;
                driver.writer = Some(writer);
                event
            }
            cmd = cmd_rx.recv() => Event::Command(cmd.unwrap_or(Command::Close)),
        };

        if !driver.dispatch(event) {
            break;
        }
    }

    info!("Disconnected from server");
}

/// Resolve the op in `slot`, or never resolve if it is empty
async fn next_completion<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot {
        Some(op) => op.await,
        None => std::future::pending().await,
    }
}

fn read_header<T: Transport>(mut reader: ReadHalf<T>) -> ReadOp<T> {
    Box::pin(async move {
        let mut header = [0u8; HEADER_LENGTH];
        let result = reader.read_exact(&mut header).await.map(|_| header);
        (reader, Event::HeaderRead(result))
    })
}

fn read_body<T: Transport>(mut reader: ReadHalf<T>, len: usize) -> ReadOp<T> {
    Box::pin(async move {
        let mut body = vec![0u8; len];
        let result = reader.read_exact(&mut body).await.map(|_| body);
        (reader, Event::BodyRead(result))
    })
}

fn write_bytes<T: Transport>(mut writer: WriteHalf<T>, bytes: Bytes) -> WriteOp<T> {
    Box::pin(async move {
        let result = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;
        (writer, Event::WriteComplete(result))
    })
}

//! Connection state machine
//!
//! Sans-IO: the machine never touches a socket. The connection task feeds it
//! one [`Event`] at a time and carries out the [`Action`]s it returns. At most
//! one read and one write are outstanding at any moment.
//!
//! ```text
//! Connecting --connected--> Connected --close / I/O error / bad header--> Closed
//!      |                                                                   ^
//!      +------------------------- close / connect failed ------------------+
//! ```

use std::io;

use bytes::Bytes;
use tracing::{debug, warn};
use wirechat_core::{
    EncodeError, HeaderError, MessageFrame, MessageKind, SessionConfig, HEADER_LENGTH,
};

use crate::queue::WriteQueue;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloseReason {
    #[error("Close requested")]
    Requested,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Malformed header: {0}")]
    Malformed(HeaderError),

    #[error("Announced body length {0} exceeds maximum")]
    Oversized(usize),

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Request posted to the connection from outside its task
#[derive(Debug)]
pub enum Command {
    Write(MessageFrame),
    Close,
}

/// Input to the machine
#[derive(Debug)]
pub enum Event {
    Connected,
    ConnectFailed(io::Error),
    HeaderRead(io::Result<[u8; HEADER_LENGTH]>),
    BodyRead(io::Result<Vec<u8>>),
    WriteComplete(io::Result<()>),
    Command(Command),
}

/// Work the connection task must carry out
#[derive(Debug, PartialEq)]
pub enum Action {
    /// Read exactly one header
    ReadHeader,
    /// Read exactly this many body bytes
    ReadBody(usize),
    /// Write these bytes in full
    Write(Bytes),
    /// Hand a complete inbound frame to the sink
    Deliver(MessageFrame),
    /// Tear down the socket; no further actions follow
    Shutdown(CloseReason),
}

pub struct ConnectionMachine {
    state: ConnectionState,
    handshake: Option<MessageFrame>,
    inbound: MessageFrame,
    queue: WriteQueue,
}

impl ConnectionMachine {
    /// New machine in `Connecting`. The handshake frame is built up front so
    /// an unencodable session fails here rather than mid-connection.
    pub fn new(session: &SessionConfig) -> Result<Self, EncodeError> {
        let handshake = MessageFrame::compose(
            MessageKind::AssignReceiver,
            session.sender_id,
            session.receiver_id,
            &[],
        )?;
        Ok(Self {
            state: ConnectionState::Connecting,
            handshake: Some(handshake),
            inbound: MessageFrame::new(),
            queue: WriteQueue::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Frames waiting to be written, including one in flight
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Compute the state transition and follow-up I/O for one event
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.state == ConnectionState::Closed {
            if let Event::Command(Command::Write(_)) = event {
                debug!("Dropping write on closed connection");
            }
            return Vec::new();
        }

        match event {
            Event::Connected => self.on_connected(),
            Event::ConnectFailed(e) => self.on_connect_failed(e),
            Event::HeaderRead(result) => self.on_header(result),
            Event::BodyRead(result) => self.on_body(result),
            Event::WriteComplete(result) => self.on_write_complete(result),
            Event::Command(Command::Write(frame)) => self.on_write(frame),
            Event::Command(Command::Close) => self.close(CloseReason::Requested),
        }
    }

    fn on_connected(&mut self) -> Vec<Action> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.state = ConnectionState::Connected;

        // Frames posted while connecting wait behind the handshake
        if let Some(handshake) = self.handshake.take() {
            self.queue.push_front(handshake);
        }

        let mut actions: Vec<Action> = self.write_head().into_iter().collect();
        actions.push(Action::ReadHeader);
        actions
    }

    fn on_connect_failed(&mut self, e: io::Error) -> Vec<Action> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.close(CloseReason::ConnectFailed(e.to_string()))
    }

    fn on_header(&mut self, result: io::Result<[u8; HEADER_LENGTH]>) -> Vec<Action> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }
        let header = match result {
            Ok(header) => header,
            Err(e) => return self.close(read_failure(e)),
        };

        *self.inbound.header_mut() = header;
        match self.inbound.decode_header() {
            Ok(0) => {
                let frame = std::mem::take(&mut self.inbound);
                vec![Action::Deliver(frame), Action::ReadHeader]
            }
            Ok(len) => vec![Action::ReadBody(len)],
            Err(HeaderError::Oversized(len)) => self.close(CloseReason::Oversized(len)),
            Err(e) => self.close(CloseReason::Malformed(e)),
        }
    }

    fn on_body(&mut self, result: io::Result<Vec<u8>>) -> Vec<Action> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }
        let body = match result {
            Ok(body) => body,
            Err(e) => return self.close(read_failure(e)),
        };
        if body.len() != self.inbound.body_length() {
            return self.close(CloseReason::ReadFailed(format!(
                "expected {} body bytes, got {}",
                self.inbound.body_length(),
                body.len()
            )));
        }

        self.inbound.body_mut().copy_from_slice(&body);
        let frame = std::mem::take(&mut self.inbound);
        vec![Action::Deliver(frame), Action::ReadHeader]
    }

    fn on_write_complete(&mut self, result: io::Result<()>) -> Vec<Action> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }
        if let Err(e) = result {
            return self.close(CloseReason::WriteFailed(e.to_string()));
        }
        self.queue.complete_head();
        self.write_head().into_iter().collect()
    }

    fn on_write(&mut self, frame: MessageFrame) -> Vec<Action> {
        match self.state {
            ConnectionState::Connecting => {
                self.queue.push_back(frame);
                Vec::new()
            }
            ConnectionState::Connected => {
                if self.queue.push_back(frame) {
                    self.write_head().into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            ConnectionState::Closed => Vec::new(),
        }
    }

    fn write_head(&self) -> Option<Action> {
        self.queue
            .head()
            .map(|head| Action::Write(Bytes::from(head.to_bytes())))
    }

    fn close(&mut self, reason: CloseReason) -> Vec<Action> {
        self.state = ConnectionState::Closed;
        self.handshake = None;
        let abandoned = self.queue.clear();
        if abandoned > 0 {
            debug!(abandoned, "Discarding unsent frames");
        }
        match &reason {
            CloseReason::Requested => debug!("Connection closed on request"),
            other => warn!(reason = %other, "Connection closed"),
        }
        vec![Action::Shutdown(reason)]
    }
}

/// EOF in the middle of either read means the peer went away
fn read_failure(e: io::Error) -> CloseReason {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        CloseReason::PeerClosed
    } else {
        CloseReason::ReadFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionConfig {
        SessionConfig::new("tester", 1.0, 2.0).unwrap()
    }

    fn connected_machine() -> ConnectionMachine {
        let mut machine = ConnectionMachine::new(&session()).unwrap();
        machine.handle(Event::Connected);
        machine
    }

    fn user_frame(body: &[u8]) -> MessageFrame {
        MessageFrame::compose(MessageKind::SendMessage, 1.0, 2.0, body).unwrap()
    }

    fn header_for(body: &[u8]) -> [u8; HEADER_LENGTH] {
        *MessageFrame::compose(MessageKind::SendMessage, 9.0, 1.0, body)
            .unwrap()
            .header()
    }

    fn write_count(actions: &[Action]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, Action::Write(_)))
            .count()
    }

    #[test]
    fn test_connect_sends_handshake_and_reads_header() {
        let mut machine = ConnectionMachine::new(&session()).unwrap();
        assert_eq!(machine.state(), ConnectionState::Connecting);

        let actions = machine.handle(Event::Connected);
        assert_eq!(machine.state(), ConnectionState::Connected);

        let handshake = MessageFrame::compose(MessageKind::AssignReceiver, 1.0, 2.0, &[])
            .unwrap()
            .to_bytes();
        assert_eq!(
            actions,
            vec![Action::Write(Bytes::from(handshake)), Action::ReadHeader]
        );
    }

    #[test]
    fn test_single_write_in_flight() {
        let mut machine = connected_machine();

        // Handshake is in flight; later writes only queue
        assert!(machine.handle(Event::Command(Command::Write(user_frame(b"a")))).is_empty());
        assert!(machine.handle(Event::Command(Command::Write(user_frame(b"b")))).is_empty());
        assert_eq!(machine.queued(), 3);

        let actions = machine.handle(Event::WriteComplete(Ok(())));
        assert_eq!(write_count(&actions), 1);
        assert_eq!(
            actions[0],
            Action::Write(Bytes::from(user_frame(b"a").to_bytes()))
        );

        let actions = machine.handle(Event::WriteComplete(Ok(())));
        assert_eq!(
            actions,
            vec![Action::Write(Bytes::from(user_frame(b"b").to_bytes()))]
        );

        assert!(machine.handle(Event::WriteComplete(Ok(()))).is_empty());
        assert_eq!(machine.queued(), 0);
    }

    #[test]
    fn test_idle_write_starts_immediately() {
        let mut machine = connected_machine();
        machine.handle(Event::WriteComplete(Ok(())));

        let actions = machine.handle(Event::Command(Command::Write(user_frame(b"now"))));
        assert_eq!(
            actions,
            vec![Action::Write(Bytes::from(user_frame(b"now").to_bytes()))]
        );
    }

    #[test]
    fn test_writes_while_connecting_follow_handshake() {
        let mut machine = ConnectionMachine::new(&session()).unwrap();
        assert!(machine.handle(Event::Command(Command::Write(user_frame(b"early")))).is_empty());

        let actions = machine.handle(Event::Connected);
        assert_eq!(write_count(&actions), 1);
        match &actions[0] {
            Action::Write(bytes) => assert_eq!(&bytes[4..8], b"   3"),
            other => panic!("Expected handshake write, got {:?}", other),
        }

        let actions = machine.handle(Event::WriteComplete(Ok(())));
        assert_eq!(
            actions,
            vec![Action::Write(Bytes::from(user_frame(b"early").to_bytes()))]
        );
    }

    #[test]
    fn test_header_then_body_delivers_frame() {
        let mut machine = connected_machine();

        let actions = machine.handle(Event::HeaderRead(Ok(header_for(b"hello"))));
        assert_eq!(actions, vec![Action::ReadBody(5)]);

        let actions = machine.handle(Event::BodyRead(Ok(b"hello".to_vec())));
        assert_eq!(actions.len(), 2);
        match &actions[0] {
            Action::Deliver(frame) => {
                assert_eq!(frame.body(), b"hello");
                assert_eq!(frame.kind(), Some(MessageKind::SendMessage));
            }
            other => panic!("Expected delivery, got {:?}", other),
        }
        assert_eq!(actions[1], Action::ReadHeader);
    }

    #[test]
    fn test_empty_body_skips_body_read() {
        let mut machine = connected_machine();
        let actions = machine.handle(Event::HeaderRead(Ok(header_for(b""))));
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], Action::Deliver(f) if f.body().is_empty()));
        assert_eq!(actions[1], Action::ReadHeader);
    }

    #[test]
    fn test_oversized_header_closes() {
        let mut machine = connected_machine();
        let mut header = [b' '; HEADER_LENGTH];
        header[..4].copy_from_slice(b" 600");

        let actions = machine.handle(Event::HeaderRead(Ok(header)));
        assert_eq!(actions, vec![Action::Shutdown(CloseReason::Oversized(600))]);
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_malformed_header_closes() {
        let mut machine = connected_machine();
        let header = [b'z'; HEADER_LENGTH];

        let actions = machine.handle(Event::HeaderRead(Ok(header)));
        assert!(matches!(
            actions.as_slice(),
            [Action::Shutdown(CloseReason::Malformed(HeaderError::Malformed { .. }))]
        ));
    }

    #[test]
    fn test_eof_is_peer_closed() {
        let mut machine = connected_machine();
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let actions = machine.handle(Event::HeaderRead(Err(eof)));
        assert_eq!(actions, vec![Action::Shutdown(CloseReason::PeerClosed)]);
    }

    #[test]
    fn test_body_read_failure_closes_without_delivery() {
        let mut machine = connected_machine();
        assert_eq!(
            machine.handle(Event::HeaderRead(Ok(header_for(b"hello")))),
            vec![Action::ReadBody(5)]
        );

        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let actions = machine.handle(Event::BodyRead(Err(eof)));
        assert_eq!(actions, vec![Action::Shutdown(CloseReason::PeerClosed)]);
        assert_eq!(machine.state(), ConnectionState::Closed);

        let mut machine = connected_machine();
        machine.handle(Event::HeaderRead(Ok(header_for(b"hello"))));
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let actions = machine.handle(Event::BodyRead(Err(reset)));
        assert!(matches!(
            actions.as_slice(),
            [Action::Shutdown(CloseReason::ReadFailed(_))]
        ));
    }

    #[test]
    fn test_write_error_closes_and_drops_queue() {
        let mut machine = connected_machine();
        machine.handle(Event::Command(Command::Write(user_frame(b"a"))));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let actions = machine.handle(Event::WriteComplete(Err(reset)));
        assert!(matches!(
            actions.as_slice(),
            [Action::Shutdown(CloseReason::WriteFailed(_))]
        ));
        assert_eq!(machine.queued(), 0);
    }

    #[test]
    fn test_close_while_connecting_abandons_queue() {
        let mut machine = ConnectionMachine::new(&session()).unwrap();
        machine.handle(Event::Command(Command::Write(user_frame(b"a"))));
        machine.handle(Event::Command(Command::Write(user_frame(b"b"))));

        let actions = machine.handle(Event::Command(Command::Close));
        assert_eq!(actions, vec![Action::Shutdown(CloseReason::Requested)]);
        assert_eq!(machine.queued(), 0);

        // A late connect completion must not resurrect the connection
        assert!(machine.handle(Event::Connected).is_empty());
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connect_failure_closes() {
        let mut machine = ConnectionMachine::new(&session()).unwrap();
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let actions = machine.handle(Event::ConnectFailed(refused));
        assert!(matches!(
            actions.as_slice(),
            [Action::Shutdown(CloseReason::ConnectFailed(_))]
        ));
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut machine = connected_machine();
        machine.handle(Event::Command(Command::Close));

        assert!(machine.handle(Event::Command(Command::Close)).is_empty());
        assert!(machine
            .handle(Event::Command(Command::Write(user_frame(b"late"))))
            .is_empty());
        assert!(machine.handle(Event::WriteComplete(Ok(()))).is_empty());
        assert!(machine
            .handle(Event::HeaderRead(Ok(header_for(b"x"))))
            .is_empty());
        assert_eq!(machine.queued(), 0);
    }
}
